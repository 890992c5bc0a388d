use super::Metadata;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Immutable content-addressed object. One row per distinct `sha256`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Blob {
    /// Generated when empty.
    #[serde(default)]
    pub id: String,
    pub sha256: String,
    pub size_bytes: i64,
    pub storage_backend: String,
    pub blob_key: String,
    pub created_at: DateTime<Utc>,
}

impl Blob {
    #[must_use]
    pub fn new(
        sha256: impl Into<String>,
        size_bytes: i64,
        storage_backend: impl Into<String>,
        blob_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            sha256: sha256.into(),
            size_bytes,
            storage_backend: storage_backend.into(),
            blob_key: blob_key.into(),
            created_at: now,
        }
    }
}

macro_rules! str_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_lowercase();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|value| value.as_str() == normalized)
                    .ok_or_else(|| StoreError::validation($field, format!("unknown value '{s}'")))
            }
        }
    };
}

pub(crate) use str_enum;

/// What an attachment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Spec,
    Diagram,
    Artifact,
    Diagnostic,
    Archive,
    #[default]
    Other,
}

str_enum!(AttachmentKind, "attachment kind", {
    Spec => "spec",
    Diagram => "diagram",
    Artifact => "artifact",
    Diagnostic => "diagnostic",
    Archive => "archive",
    Other => "other",
});

/// Where attachment content lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    ManagedBlob,
    ExternalUrl,
    RepoPath,
}

str_enum!(SourceType, "source type", {
    ManagedBlob => "managed_blob",
    ExternalUrl => "external_url",
    RepoPath => "repo_path",
});

/// How the media type was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaTypeSource {
    Sniffed,
    Declared,
    Inferred,
    #[default]
    Unknown,
}

str_enum!(MediaTypeSource, "media type source", {
    Sniffed => "sniffed",
    Declared => "declared",
    Inferred => "inferred",
    Unknown => "unknown",
});

/// Task-scoped reference to content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Attachment {
    /// Generated when empty.
    #[serde(default)]
    pub id: String,
    pub task_id: String,
    #[serde(default)]
    pub kind: AttachmentKind,
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub media_type_source: MediaTypeSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Attachment {
    /// Skeleton attachment of the given source type; callers fill the locator.
    #[must_use]
    pub fn new(task_id: impl Into<String>, source_type: SourceType, now: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            task_id: task_id.into(),
            kind: AttachmentKind::Other,
            source_type,
            title: None,
            filename: None,
            media_type: None,
            media_type_source: MediaTypeSource::Unknown,
            blob_id: None,
            external_url: None,
            repo_path: None,
            meta: Metadata::new(),
            labels: Vec::new(),
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }
}
