//! `taskstore` - embedded persistence layer for an agent-facing task tracker
//!
//! This crate stores tasks, their labels and dependency edges,
//! content-addressed attachments and links to git objects in a single
//! `SQLite` file, and exposes query, mutation and graph operations over them.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`cli`] - The `tstore` operational command line
//! - [`model`] - Data types (Task, Dependency, Attachment, `GitRepo`, reports)
//! - [`storage`] - `SQLite` database layer, migrations and queries
//! - [`config`] - Store discovery and layered configuration
//! - [`error`] - Error types and handling
//! - [`logging`] - `tracing` subscriber setup
//! - [`util`] - Utility functions (ids, labels, hashing, time)

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod storage;
pub mod util;

pub use error::{ErrorCode, Result, StoreError};
pub use storage::SqliteStorage;
