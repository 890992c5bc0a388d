//! Opaque user and session records for an external credential layer.
//!
//! Hashing passwords and minting tokens is the caller's job; this module only
//! stores the resulting hashes and answers lookups.

use crate::error::{Result, StoreError, is_unique_violation};
use crate::model::{NewUser, Session, User};
use crate::storage::sqlite::SqliteStorage;
use crate::util::id::generate_id_checked;
use crate::util::time::{format_ts, opt_ts_column, ts_column};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

const USER_PREFIX: &str = "us";
const SESSION_PREFIX: &str = "se";

const USER_COLUMNS: &str =
    "id, username, display_name, password_hash, disabled_at, created_at, updated_at";
const SESSION_COLUMNS: &str = "s.id, s.user_id, s.token_hash, s.created_at, s.expires_at, s.revoked_at";

/// CRUD surface consumed by the credential layer.
pub trait CredentialStore {
    /// # Errors
    ///
    /// Returns a validation error for a blank or taken username.
    fn create_user(&self, user: &NewUser, now: DateTime<Utc>) -> Result<User>;

    /// # Errors
    ///
    /// Returns an error if the database query fails.
    fn find_user(&self, id: &str) -> Result<Option<User>>;

    /// # Errors
    ///
    /// Returns an error if the database query fails.
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Mark a user disabled; their sessions stop validating.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    fn disable_user(&self, id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Delete a user and their sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    fn delete_user(&self, id: &str) -> Result<bool>;

    /// # Errors
    ///
    /// Returns a validation error for an unknown or disabled user.
    fn create_session(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Session>;

    /// The live session for `token_hash`: not revoked, not expired at `now`,
    /// and owned by an enabled user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    fn validate_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<Session>>;

    /// # Errors
    ///
    /// Returns an error if the database update fails.
    fn revoke_session(&self, token_hash: &str, at: DateTime<Utc>) -> Result<bool>;
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        password_hash: row.get(3)?,
        disabled_at: opt_ts_column(row, 4)?,
        created_at: ts_column(row, 5)?,
        updated_at: ts_column(row, 6)?,
    })
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        token_hash: row.get(2)?,
        created_at: ts_column(row, 3)?,
        expires_at: ts_column(row, 4)?,
        revoked_at: opt_ts_column(row, 5)?,
    })
}

impl CredentialStore for SqliteStorage {
    fn create_user(&self, user: &NewUser, now: DateTime<Utc>) -> Result<User> {
        let username = user.username.trim();
        if username.is_empty() {
            return Err(StoreError::validation("username", "must not be empty"));
        }
        if user.password_hash.is_empty() {
            return Err(StoreError::validation("password_hash", "must not be empty"));
        }

        let id = generate_id_checked(USER_PREFIX, |candidate| {
            Ok(self.find_user(candidate)?.is_some())
        })?;
        let ts = format_ts(&now);
        let result = self.conn.execute(
            "INSERT INTO users (id, username, display_name, password_hash, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            rusqlite::params![id, username, user.display_name, user.password_hash, ts, ts],
        );
        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::validation(
                    "username",
                    format!("'{username}' is already taken"),
                ));
            }
            Err(err) => return Err(err.into()),
        }

        Ok(User {
            id,
            username: username.to_string(),
            display_name: user.display_name.clone(),
            password_hash: user.password_hash.clone(),
            disabled_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn find_user(&self, id: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        Ok(self.conn.query_row(&sql, [id], user_from_row).optional()?)
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?");
        Ok(self
            .conn
            .query_row(&sql, [username.trim()], user_from_row)
            .optional()?)
    }

    fn disable_user(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let ts = format_ts(&at);
        let rows = self.conn.execute(
            "UPDATE users SET disabled_at = COALESCE(disabled_at, ?), updated_at = ? WHERE id = ?",
            rusqlite::params![ts, ts, id],
        )?;
        Ok(rows > 0)
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self.conn.execute("DELETE FROM users WHERE id = ?", [id])?;
        Ok(rows > 0)
    }

    fn create_session(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        if token_hash.is_empty() {
            return Err(StoreError::validation("token_hash", "must not be empty"));
        }
        match self.find_user(user_id)? {
            None => return Err(StoreError::validation("user_id", format!("unknown user {user_id}"))),
            Some(user) if user.disabled_at.is_some() => {
                return Err(StoreError::validation("user_id", format!("user {user_id} is disabled")));
            }
            Some(_) => {}
        }

        let id = generate_id_checked(SESSION_PREFIX, |candidate| {
            Ok(self
                .conn
                .prepare_cached("SELECT 1 FROM sessions WHERE id = ?")?
                .exists([candidate])?)
        })?;
        self.conn.execute(
            "INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?)",
            rusqlite::params![id, user_id, token_hash, format_ts(&now), format_ts(&expires_at)],
        )?;

        Ok(Session {
            id,
            user_id: user_id.to_string(),
            token_hash: token_hash.to_string(),
            created_at: now,
            expires_at,
            revoked_at: None,
        })
    }

    fn validate_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token_hash = ? AND s.revoked_at IS NULL AND s.expires_at > ?
               AND u.disabled_at IS NULL"
        );
        Ok(self
            .conn
            .query_row(
                &sql,
                rusqlite::params![token_hash, format_ts(&now)],
                session_from_row,
            )
            .optional()?)
    }

    fn revoke_session(&self, token_hash: &str, at: DateTime<Utc>) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE sessions SET revoked_at = ? WHERE token_hash = ? AND revoked_at IS NULL",
            rusqlite::params![format_ts(&at), token_hash],
        )?;
        Ok(rows > 0)
    }
}
