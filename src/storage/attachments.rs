//! Content-addressed blobs and task attachments.
//!
//! A blob row is keyed by its SHA-256 digest and written once: the first
//! writer of a digest wins and every later upsert reads back that row.
//! Attachments point at a blob, an external URL, or a path in a repository.

use crate::error::{Result, StoreError};
use crate::model::{Attachment, Blob, SourceType};
use crate::storage::sqlite::{SqliteStorage, enum_column, json_column};
use crate::util::id::generate_id_checked;
use crate::util::time::{format_opt_ts, format_ts, opt_ts_column, ts_column};
use crate::util::{is_sha256_hex, normalize_labels};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

const BLOB_PREFIX: &str = "bl";
const ATTACHMENT_PREFIX: &str = "at";

const BLOB_COLUMNS: &str = "id, sha256, size_bytes, storage_backend, blob_key, created_at";

const ATTACHMENT_COLUMNS: &str = "id, task_id, kind, source_type, title, filename, media_type, \
     media_type_source, blob_id, external_url, repo_path, meta, created_at, updated_at, expires_at";

fn blob_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Blob> {
    Ok(Blob {
        id: row.get(0)?,
        sha256: row.get(1)?,
        size_bytes: row.get(2)?,
        storage_backend: row.get(3)?,
        blob_key: row.get(4)?,
        created_at: ts_column(row, 5)?,
    })
}

fn attachment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        kind: enum_column(row, 2)?,
        source_type: enum_column(row, 3)?,
        title: row.get(4)?,
        filename: row.get(5)?,
        media_type: row.get(6)?,
        media_type_source: enum_column(row, 7)?,
        blob_id: row.get(8)?,
        external_url: row.get(9)?,
        repo_path: row.get(10)?,
        meta: json_column(row, 11)?,
        labels: Vec::new(),
        created_at: ts_column(row, 12)?,
        updated_at: ts_column(row, 13)?,
        expires_at: opt_ts_column(row, 14)?,
    })
}

fn get_blob_by_sha(conn: &Connection, sha256: &str) -> Result<Option<Blob>> {
    let sql = format!("SELECT {BLOB_COLUMNS} FROM blobs WHERE sha256 = ?");
    Ok(conn.query_row(&sql, [sha256], blob_from_row).optional()?)
}

/// Insert a blob unless its digest is already stored, then return the
/// stored row for that digest.
pub(crate) fn upsert_blob_in(conn: &Connection, blob: &Blob) -> Result<Blob> {
    let sha256 = blob.sha256.trim().to_lowercase();
    if sha256.is_empty() {
        return Err(StoreError::validation("sha256", "must not be empty"));
    }
    if !is_sha256_hex(&sha256) {
        return Err(StoreError::validation(
            "sha256",
            "must be 64 hexadecimal characters",
        ));
    }
    if blob.blob_key.trim().is_empty() {
        return Err(StoreError::validation("blob_key", "must not be empty"));
    }
    if blob.storage_backend.trim().is_empty() {
        return Err(StoreError::validation("storage_backend", "must not be empty"));
    }
    if blob.size_bytes < 0 {
        return Err(StoreError::validation("size_bytes", "must not be negative"));
    }

    let id = if blob.id.trim().is_empty() {
        generate_id_checked(BLOB_PREFIX, |candidate| {
            Ok(conn
                .prepare_cached("SELECT 1 FROM blobs WHERE id = ?")?
                .exists([candidate])?)
        })?
    } else {
        blob.id.trim().to_string()
    };

    let inserted = conn.execute(
        "INSERT INTO blobs (id, sha256, size_bytes, storage_backend, blob_key, created_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(sha256) DO NOTHING",
        rusqlite::params![
            id,
            sha256,
            blob.size_bytes,
            blob.storage_backend,
            blob.blob_key,
            format_ts(&blob.created_at)
        ],
    )?;
    debug!(sha256 = %sha256, inserted = inserted > 0, "Upserted blob");

    get_blob_by_sha(conn, &sha256)?
        .ok_or(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))
}

fn validate_attachment(att: &Attachment) -> Result<()> {
    if att.task_id.trim().is_empty() {
        return Err(StoreError::validation("task_id", "must not be empty"));
    }
    let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
    let (field, ok) = match att.source_type {
        SourceType::ManagedBlob => ("blob_id", present(&att.blob_id)),
        SourceType::ExternalUrl => ("external_url", present(&att.external_url)),
        SourceType::RepoPath => ("repo_path", present(&att.repo_path)),
    };
    if ok {
        Ok(())
    } else {
        Err(StoreError::validation(
            field,
            format!("required for {} attachments", att.source_type),
        ))
    }
}

/// Insert an attachment and its labels. Returns the stored attachment.
pub(crate) fn insert_attachment(conn: &Connection, att: &Attachment) -> Result<Attachment> {
    validate_attachment(att)?;

    let id = if att.id.trim().is_empty() {
        generate_id_checked(ATTACHMENT_PREFIX, |candidate| {
            Ok(conn
                .prepare_cached("SELECT 1 FROM attachments WHERE id = ?")?
                .exists([candidate])?)
        })?
    } else {
        att.id.trim().to_string()
    };

    conn.execute(
        "INSERT INTO attachments (
            id, task_id, kind, source_type, title, filename, media_type,
            media_type_source, blob_id, external_url, repo_path, meta,
            created_at, updated_at, expires_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            att.task_id,
            att.kind.as_str(),
            att.source_type.as_str(),
            att.title,
            att.filename,
            att.media_type,
            att.media_type_source.as_str(),
            att.blob_id,
            att.external_url,
            att.repo_path,
            serde_json::to_string(&att.meta)?,
            format_ts(&att.created_at),
            format_ts(&att.updated_at),
            format_opt_ts(att.expires_at.as_ref()),
        ],
    )?;

    let labels = normalize_labels(&att.labels);
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO attachment_labels (attachment_id, label) VALUES (?, ?)",
    )?;
    for label in &labels {
        stmt.execute(rusqlite::params![id, label])?;
    }

    Ok(Attachment {
        id,
        labels,
        ..att.clone()
    })
}

fn attachment_labels(conn: &Connection, attachment_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT label FROM attachment_labels WHERE attachment_id = ? ORDER BY label",
    )?;
    let labels = stmt
        .query_map([attachment_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(labels)
}

impl SqliteStorage {
    /// Store blob metadata, deduplicated by digest.
    ///
    /// The returned row is the canonical one for `blob.sha256`; if another
    /// writer stored that digest first, its id and key are returned.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a missing digest or key, or a negative
    /// size.
    pub fn upsert_blob(&mut self, blob: &Blob) -> Result<Blob> {
        self.mutate("upsert_blob", |tx, _| upsert_blob_in(tx, blob))
    }

    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_blob(&self, id: &str) -> Result<Option<Blob>> {
        let sql = format!("SELECT {BLOB_COLUMNS} FROM blobs WHERE id = ?");
        Ok(self.conn.query_row(&sql, [id], blob_from_row).optional()?)
    }

    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_blob_by_sha256(&self, sha256: &str) -> Result<Option<Blob>> {
        get_blob_by_sha(&self.conn, &sha256.trim().to_lowercase())
    }

    /// Delete blob metadata.
    ///
    /// # Errors
    ///
    /// Fails with an engine constraint error while any attachment still
    /// references the blob.
    pub fn delete_blob(&self, id: &str) -> Result<bool> {
        let rows = self.conn.execute("DELETE FROM blobs WHERE id = ?", [id])?;
        Ok(rows > 0)
    }

    /// Blobs no attachment points at, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_unreferenced_blobs(&self, limit: usize) -> Result<Vec<Blob>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.id, b.sha256, b.size_bytes, b.storage_backend, b.blob_key, b.created_at
             FROM blobs b
             LEFT JOIN attachments a ON a.blob_id = b.id
             WHERE a.id IS NULL
             ORDER BY b.created_at ASC, b.id ASC
             LIMIT ?",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let blobs = stmt
            .query_map([limit], blob_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(blobs)
    }

    /// Create an attachment with its labels in one transaction.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the locator doesn't match the source
    /// type, or an engine error for an unknown task or blob.
    pub fn create_attachment(&mut self, attachment: &Attachment) -> Result<Attachment> {
        self.mutate("create_attachment", |tx, _| insert_attachment(tx, attachment))
    }

    /// Upsert a blob and attach it to a task in one transaction.
    ///
    /// The attachment's `blob_id` is set to the canonical blob id. If the
    /// attachment cannot be stored the blob row is not kept either.
    ///
    /// # Errors
    ///
    /// Returns the first validation or engine error; nothing is persisted.
    pub fn create_managed_attachment_with_blob(
        &mut self,
        blob: &Blob,
        attachment: &Attachment,
    ) -> Result<(Blob, Attachment)> {
        self.mutate("create_managed_attachment_with_blob", |tx, _| {
            let blob = upsert_blob_in(tx, blob)?;
            let attachment = Attachment {
                source_type: SourceType::ManagedBlob,
                blob_id: Some(blob.id.clone()),
                ..attachment.clone()
            };
            let attachment = insert_attachment(tx, &attachment)?;
            Ok((blob, attachment))
        })
    }

    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_attachment(&self, id: &str) -> Result<Option<Attachment>> {
        let sql = format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = ?");
        let Some(mut attachment) = self
            .conn
            .query_row(&sql, [id], attachment_from_row)
            .optional()?
        else {
            return Ok(None);
        };
        attachment.labels = attachment_labels(&self.conn, id)?;
        Ok(Some(attachment))
    }

    /// Attachments of one task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_attachments(&self, task_id: &str) -> Result<Vec<Attachment>> {
        let sql = format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE task_id = ? \
             ORDER BY created_at ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut attachments = stmt
            .query_map([task_id], attachment_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for attachment in &mut attachments {
            attachment.labels = attachment_labels(&self.conn, &attachment.id)?;
        }
        Ok(attachments)
    }

    /// Delete an attachment. Its blob stays and may become unreferenced.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn delete_attachment(&self, id: &str) -> Result<bool> {
        let rows = self.conn.execute("DELETE FROM attachments WHERE id = ?", [id])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MediaTypeSource, Task};
    use crate::util::sha256_hex;
    use chrono::Utc;

    #[test]
    fn upsert_blob_rejects_bad_digest() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let blob = Blob::new("not-a-digest", 1, "local", "k", Utc::now());
        let err = storage.upsert_blob(&blob).unwrap_err();
        assert!(matches!(err, StoreError::Validation { ref field, .. } if field == "sha256"));
    }

    #[test]
    fn upsert_blob_normalizes_case() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let digest = sha256_hex(b"case");
        let stored = storage
            .upsert_blob(&Blob::new(digest.to_uppercase(), 4, "local", "k", Utc::now()))
            .unwrap();
        assert_eq!(stored.sha256, digest);
        assert!(stored.id.starts_with("bl-"));
    }

    #[test]
    fn locator_must_match_source_type() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .create_task(&Task::new("ts-att1", "Attach", Utc::now()), &[], &[])
            .unwrap();

        let attachment = Attachment::new("ts-att1", SourceType::ExternalUrl, Utc::now());
        let err = storage.create_attachment(&attachment).unwrap_err();
        assert!(matches!(err, StoreError::Validation { ref field, .. } if field == "external_url"));
    }

    #[test]
    fn attachment_labels_normalized() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .create_task(&Task::new("ts-att2", "Attach", Utc::now()), &[], &[])
            .unwrap();

        let mut attachment = Attachment::new("ts-att2", SourceType::RepoPath, Utc::now());
        attachment.repo_path = Some("docs/design.md".to_string());
        attachment.labels = vec!["Docs ".into(), "docs".into(), "Arch".into()];

        let stored = storage.create_attachment(&attachment).unwrap();
        assert!(stored.id.starts_with("at-"));
        assert_eq!(stored.labels, vec!["arch", "docs"]);
        assert_eq!(stored.media_type_source, MediaTypeSource::Unknown);

        let fetched = storage.get_attachment(&stored.id).unwrap().unwrap();
        assert_eq!(fetched, stored);
    }
}
