//! Short random identifiers.
//!
//! Format: `<prefix>-XXXX` where `XXXX` is four base36 characters drawn from
//! the thread-local CSPRNG. Collisions are checked through a caller-supplied
//! predicate and retried a bounded number of times.

use crate::error::{Result, StoreError};
use rand::Rng;

/// Base36 alphabet (lower-case).
const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Random suffix length.
pub const SUFFIX_LEN: usize = 4;

/// Attempts before giving up on a colliding prefix.
pub const MAX_ID_ATTEMPTS: usize = 20;

/// Generate a new id without an existence check.
///
/// # Errors
///
/// Returns a validation error if `prefix` is empty.
pub fn generate_id(prefix: &str) -> Result<String> {
    generate_id_checked(prefix, |_| Ok(false))
}

/// Generate a new id, retrying while `exists` reports a collision.
///
/// # Errors
///
/// Returns a validation error if `prefix` is empty, propagates errors from
/// `exists`, and returns [`StoreError::IdExhausted`] after
/// [`MAX_ID_ATTEMPTS`] collisions.
pub fn generate_id_checked<F>(prefix: &str, mut exists: F) -> Result<String>
where
    F: FnMut(&str) -> Result<bool>,
{
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(StoreError::validation("prefix", "must not be empty"));
    }

    let mut rng = rand::rng();
    for _ in 0..MAX_ID_ATTEMPTS {
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
            .collect();
        let candidate = format!("{prefix}-{suffix}");
        if !exists(&candidate)? {
            return Ok(candidate);
        }
        tracing::trace!(id = %candidate, "id collision, retrying");
    }

    Err(StoreError::IdExhausted {
        prefix: prefix.to_string(),
        attempts: MAX_ID_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_has_prefix_and_base36_suffix() {
        let id = generate_id("gr").unwrap();
        let (prefix, suffix) = id.split_once('-').unwrap();
        assert_eq!(prefix, "gr");
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn empty_prefix_fails_fast() {
        let mut calls = 0;
        let err = generate_id_checked("  ", |_| {
            calls += 1;
            Ok(false)
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
        assert_eq!(calls, 0);
    }

    #[test]
    fn retries_on_collision() {
        let mut calls = 0;
        let id = generate_id_checked("at", |_| {
            calls += 1;
            Ok(calls < 3)
        })
        .unwrap();
        assert!(id.starts_with("at-"));
        assert_eq!(calls, 3);
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let mut calls = 0;
        let err = generate_id_checked("bl", |_| {
            calls += 1;
            Ok(true)
        })
        .unwrap_err();
        assert!(matches!(
            err,
            StoreError::IdExhausted { attempts: MAX_ID_ATTEMPTS, .. }
        ));
        assert_eq!(calls, MAX_ID_ATTEMPTS);
    }
}
