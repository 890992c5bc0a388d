//! Narrow write surface for bulk importers.
//!
//! An importer gets an [`ImportMutator`] bound to one open transaction and
//! nothing else: no reads, no listing, no commit control. The transaction
//! commits only if the importer's closure returns `Ok`.

use crate::config::StorageOptions;
use crate::error::{Result, StoreError};
use crate::model::{Task, TaskUpdate};
use crate::storage::deps::{insert_dependency, remove_dependencies_of};
use crate::storage::labels::replace_labels_in;
use crate::storage::sqlite::{SqliteStorage, apply_task_update, insert_task};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};

/// Mutations an importer may perform inside one transaction.
pub trait ImportMutator {
    /// Create a task with labels and blocking parents. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns a validation or engine error; the import should abort.
    fn create_task(&self, task: &Task, labels: &[String], dependencies: &[String])
    -> Result<String>;

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] for an unknown id.
    fn update_task(&self, id: &str, update: &TaskUpdate, updated_at: DateTime<Utc>) -> Result<()>;

    /// Add a `blocks` edge. Returns false if it already existed.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a self-dependency.
    fn add_dependency(&self, child_id: &str, parent_id: &str) -> Result<bool>;

    /// Replace the label set of a task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] for an unknown id.
    fn replace_labels(&self, task_id: &str, labels: &[String]) -> Result<Vec<String>>;

    /// Drop every edge where `child_id` is the blocked side.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    fn remove_dependencies(&self, child_id: &str) -> Result<usize>;
}

/// [`ImportMutator`] over a borrowed transaction.
pub struct TxMutator<'a> {
    conn: &'a Connection,
    options: &'a StorageOptions,
}

impl<'a> TxMutator<'a> {
    #[must_use]
    pub fn new(tx: &'a Transaction<'_>, options: &'a StorageOptions) -> Self {
        Self { conn: tx, options }
    }
}

impl ImportMutator for TxMutator<'_> {
    fn create_task(
        &self,
        task: &Task,
        labels: &[String],
        dependencies: &[String],
    ) -> Result<String> {
        insert_task(self.conn, self.options, task, labels, dependencies)
    }

    fn update_task(&self, id: &str, update: &TaskUpdate, updated_at: DateTime<Utc>) -> Result<()> {
        if apply_task_update(self.conn, id, update, updated_at)? {
            Ok(())
        } else {
            Err(StoreError::TaskNotFound { id: id.to_string() })
        }
    }

    fn add_dependency(&self, child_id: &str, parent_id: &str) -> Result<bool> {
        insert_dependency(self.conn, self.options, child_id, parent_id, Utc::now())
    }

    fn replace_labels(&self, task_id: &str, labels: &[String]) -> Result<Vec<String>> {
        replace_labels_in(self.conn, task_id, labels)
    }

    fn remove_dependencies(&self, child_id: &str) -> Result<usize> {
        remove_dependencies_of(self.conn, child_id)
    }
}

impl SqliteStorage {
    /// Run an import inside one transaction.
    ///
    /// Everything `f` does through the mutator commits together when it
    /// returns `Ok`, and is discarded when it returns an error.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or from the commit.
    pub fn run_import<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&dyn ImportMutator) -> Result<R>,
    {
        self.mutate("import", |tx, options| f(&TxMutator::new(tx, options)))
    }
}
