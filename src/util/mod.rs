//! Small shared helpers: ID generation, label normalization, digests, time.

pub mod id;
pub mod time;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

static SHA256_HEX: Lazy<Regex> = Lazy::new(|| Regex::new("^[0-9a-f]{64}$").expect("valid regex"));

/// Normalize a label set: trim, lower-case, drop empties, dedupe, sort.
#[must_use]
pub fn normalize_labels<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    let mut out: Vec<String> = labels
        .iter()
        .map(|label| label.as_ref().trim().to_lowercase())
        .filter(|label| !label.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Normalize a single label, returning `None` when nothing is left.
#[must_use]
pub fn normalize_label(label: &str) -> Option<String> {
    let label = label.trim().to_lowercase();
    if label.is_empty() { None } else { Some(label) }
}

/// Lower-case hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// True when `value` is a 64 character lower-case hex digest.
#[must_use]
pub fn is_sha256_hex(value: &str) -> bool {
    SHA256_HEX.is_match(value)
}

/// Project prefix of an id (`"ts"` for `"ts-a1b2"`).
#[must_use]
pub fn project_of(id: &str) -> &str {
    id.split_once('-').map_or(id, |(prefix, _)| prefix)
}
