#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use taskstore::model::{NewTask, Priority, Status, Task, TaskType};
use taskstore::storage::SqliteStorage;

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// Unique, deterministic-looking ids for fixtures.
pub fn next_id() -> String {
    format!("ts-{:04}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

pub struct TaskBuilder {
    task: Task,
    labels: Vec<String>,
    dependencies: Vec<String>,
}

impl TaskBuilder {
    pub fn new(title: &str) -> Self {
        Self {
            task: Task::new(next_id(), title, Utc::now()),
            labels: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.task.status = status;
        if status == Status::Closed {
            self.task.closed_at.get_or_insert(self.task.updated_at);
        } else {
            self.task.closed_at = None;
        }
        self
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task.task_type = task_type;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.task.priority = Priority(priority);
        self
    }

    pub fn with_assignee(mut self, assignee: &str) -> Self {
        self.task.assignee = Some(assignee.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.task.description = description.to_string();
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.task.notes = notes.to_string();
        self
    }

    pub fn with_spec_id(mut self, spec_id: &str) -> Self {
        self.task.spec_id = Some(spec_id.to_string());
        self
    }

    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.task.parent_id = Some(parent_id.to_string());
        self
    }

    /// Set both timestamps (and `closed_at` for closed tasks).
    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.task.created_at = ts;
        self.task.updated_at = ts;
        if self.task.closed_at.is_some() {
            self.task.closed_at = Some(ts);
        }
        self
    }

    pub fn days_ago(self, days: i64) -> Self {
        self.at(Utc::now() - Duration::days(days))
    }

    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(ToString::to_string).collect();
        self
    }

    pub fn blocked_by(mut self, parent_id: &str) -> Self {
        self.dependencies.push(parent_id.to_string());
        self
    }

    pub fn build(self) -> Task {
        self.task
    }

    pub fn into_new_task(self) -> NewTask {
        NewTask {
            task: self.task,
            labels: self.labels,
            dependencies: self.dependencies,
        }
    }

    /// Insert into `storage` and return the stored task.
    pub fn create(self, storage: &mut SqliteStorage) -> Task {
        let new = self.into_new_task();
        let id = storage
            .create_task(&new.task, &new.labels, &new.dependencies)
            .expect("create task");
        storage.get_task(&id).unwrap().expect("task exists")
    }
}

pub fn task(title: &str) -> Task {
    TaskBuilder::new(title).build()
}
