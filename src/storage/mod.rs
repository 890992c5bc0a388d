//! `SQLite` storage layer for `taskstore`.
//!
//! This module provides the persistence layer using `SQLite` with:
//! - WAL mode and a busy timeout for a single writer with concurrent readers
//! - Transaction discipline for atomic multi-row writes
//! - Versioned, per-transaction schema migrations
//!
//! # Submodules
//!
//! - [`schema`] - Database schema and migrations
//! - [`sqlite`] - Store handle, transactions and task CRUD
//! - [`query`] - Filtered listing, full-text search, ready and stale queries
//! - [`labels`] / [`deps`] - Labels, dependency edges and the tree walk
//! - [`attachments`] - Content-addressed blobs and task attachments
//! - [`git`] - Git repositories and task git references
//! - [`mutator`] - Transaction-bound write surface for importers
//! - [`auth`] - User and session records

pub mod attachments;
pub mod auth;
pub mod deps;
pub mod git;
pub mod labels;
pub mod mutator;
pub mod query;
pub mod schema;
pub mod sqlite;

pub use auth::CredentialStore;
pub use mutator::{ImportMutator, TxMutator};
pub use query::{ListFilter, ReadyFilter};
pub use sqlite::SqliteStorage;
