#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

/// A temp directory with a `.taskstore/` store created through the library.
pub struct StoreWorkspace {
    pub temp_dir: TempDir,
}

impl StoreWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        Self { temp_dir }
    }

    pub fn root(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    pub fn db_path(&self) -> PathBuf {
        self.root().join(".taskstore").join("tasks.db")
    }

    /// Open the workspace store directly for seeding.
    pub fn storage(&self) -> taskstore::SqliteStorage {
        std::fs::create_dir_all(self.root().join(".taskstore")).unwrap();
        taskstore::SqliteStorage::open(&self.db_path()).expect("open workspace store")
    }
}

/// `tstore` command running inside the workspace with a clean environment.
pub fn tstore(workspace: &StoreWorkspace) -> Command {
    let mut cmd = Command::cargo_bin("tstore").expect("tstore binary");
    cmd.current_dir(workspace.root())
        .env_remove("TASKSTORE_DIR")
        .env_remove("TASKSTORE_DB")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}
