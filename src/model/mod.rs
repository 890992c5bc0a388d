//! Domain types for the task store.
//!
//! Tasks, labels and dependency edges live here; attachments, git references,
//! credentials and the operational reports have their own submodules.

mod attachment;
mod auth;
mod git;
mod report;

pub use attachment::{Attachment, AttachmentKind, Blob, MediaTypeSource, SourceType};
pub use auth::{NewUser, Session, User};
pub use git::{CloseTaskGitRefInput, GitObjectType, GitRepo, TaskGitRef, TaskGitRefInput};
pub use report::{CleanupResult, MigrationPlan, PendingMigration, StoreInfo};

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Open key/value map persisted as JSON text.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    Deferred,
    Closed,
    Tombstone,
    Pinned,
}

impl Status {
    pub const ALL: [Self; 7] = [
        Self::Open,
        Self::InProgress,
        Self::Blocked,
        Self::Deferred,
        Self::Closed,
        Self::Tombstone,
        Self::Pinned,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Deferred => "deferred",
            Self::Closed => "closed",
            Self::Tombstone => "tombstone",
            Self::Pinned => "pinned",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| StoreError::validation("status", format!("unknown status '{s}'")))
    }
}

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Bug,
    Feature,
    #[default]
    Task,
    Epic,
    Chore,
}

impl TaskType {
    pub const ALL: [Self; 5] = [Self::Bug, Self::Feature, Self::Task, Self::Epic, Self::Chore];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Task => "task",
            Self::Epic => "epic",
            Self::Chore => "chore",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| StoreError::validation("type", format!("unknown task type '{s}'")))
    }
}

/// Task priority, 0 (critical) through 4 (backlog).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const CRITICAL: Self = Self(0);
    pub const HIGH: Self = Self(1);
    pub const MEDIUM: Self = Self(2);
    pub const LOW: Self = Self(3);
    pub const BACKLOG: Self = Self(4);

    /// Reject values outside 0..=4.
    ///
    /// # Errors
    ///
    /// Returns a validation error for out-of-range priorities.
    pub fn validate(self) -> crate::Result<Self> {
        if (0..=4).contains(&self.0) {
            Ok(self)
        } else {
            Err(StoreError::validation(
                "priority",
                format!("{} is outside 0..=4", self.0),
            ))
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// A unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: Status,
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub design: String,
    #[serde(default)]
    pub acceptance_criteria: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_repo: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A new open task with default type and priority.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: Status::Open,
            task_type: TaskType::Task,
            priority: Priority::MEDIUM,
            description: String::new(),
            notes: String::new(),
            design: String::new(),
            acceptance_criteria: String::new(),
            spec_id: None,
            parent_id: None,
            assignee: None,
            source_repo: None,
            custom: Metadata::new(),
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }
}

/// A task plus the labels and blocking parents created with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    #[serde(flatten)]
    pub task: Task,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Ids of tasks that block this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl NewTask {
    #[must_use]
    pub const fn new(task: Task) -> Self {
        Self {
            task,
            labels: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

/// Partial update for a task.
///
/// `None` leaves a field untouched. For the optional columns (`spec_id`,
/// `parent_id`, `assignee`, `source_repo`) an empty string clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub status: Option<Status>,
    pub task_type: Option<TaskType>,
    pub priority: Option<Priority>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub design: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub spec_id: Option<String>,
    pub parent_id: Option<String>,
    pub assignee: Option<String>,
    pub source_repo: Option<String>,
    pub custom: Option<Metadata>,
}

impl TaskUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.task_type.is_none()
            && self.priority.is_none()
            && self.description.is_none()
            && self.notes.is_none()
            && self.design.is_none()
            && self.acceptance_criteria.is_none()
            && self.spec_id.is_none()
            && self.parent_id.is_none()
            && self.assignee.is_none()
            && self.source_repo.is_none()
            && self.custom.is_none()
    }
}

/// Dependency edge type. Only `blocks` exists today.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    #[default]
    Blocks,
}

impl DependencyType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "blocks" => Ok(Self::Blocks),
            other => Err(StoreError::validation(
                "dependency type",
                format!("unknown dependency type '{other}'"),
            )),
        }
    }
}

/// Directed edge: `child_id` cannot be ready while `parent_id` is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Dependency {
    pub child_id: String,
    pub parent_id: String,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    pub created_at: DateTime<Utc>,
}

/// Direction of a dependency tree walk.
///
/// Declared in lexical order so derived ordering matches the string form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TreeDirection {
    /// Tasks that depend on the origin.
    Downstream,
    /// Tasks the origin depends on.
    Upstream,
}

impl TreeDirection {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Downstream => "downstream",
            Self::Upstream => "upstream",
        }
    }
}

/// One node emitted by a dependency tree walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TreeNode {
    pub id: String,
    pub title: String,
    pub status: Status,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// 1-based distance from the origin.
    pub depth: usize,
    pub direction: TreeDirection,
    pub edge_type: DependencyType,
}
