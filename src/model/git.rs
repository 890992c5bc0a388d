use super::Metadata;
use super::attachment::str_enum;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Canonical identity of a version-control repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GitRepo {
    pub id: String,
    /// Lower-cased, unique.
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kind of git object a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GitObjectType {
    Commit,
    Tag,
    Branch,
    Path,
    Blob,
    Tree,
}

str_enum!(GitObjectType, "object_type", {
    Commit => "commit",
    Tag => "tag",
    Branch => "branch",
    Path => "path",
    Blob => "blob",
    Tree => "tree",
});

/// Typed link from a task to a git object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskGitRef {
    pub id: String,
    pub task_id: String,
    pub repo_id: String,
    /// Denormalized repo slug.
    pub repo: String,
    pub relation: String,
    pub object_type: GitObjectType,
    pub object_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub meta: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied annotation for one task.
///
/// `object_type` arrives as text from the API layer and is validated when the
/// reference is written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskGitRefInput {
    pub task_id: String,
    pub repo_id: String,
    pub relation: String,
    pub object_type: String,
    pub object_value: String,
    #[serde(default)]
    pub resolved_commit: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub meta: Metadata,
}

/// Annotation recorded while closing a task.
pub type CloseTaskGitRefInput = TaskGitRefInput;
