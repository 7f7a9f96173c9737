//! Identifier extraction from proxy store keys.
//!
//! Keys look like `node:health:{uuid}`, `instance:{uuid}` or
//! `performance:{uuid}:function_execution_time`. Two extraction strategies
//! are supported because the key families disagree on where the identifier
//! sits: the trailing segment works for `node:*` and `instance:*`, while
//! `performance:*` keys carry a metric name after the identifier.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Segment delimiter used by every key family in the proxy store.
pub const KEY_DELIMITER: char = ':';

/// Suffix of the change-marker keys, excluded from entity listings.
pub const LAST_UPDATE_SUFFIX: &str = ":last_update";

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("static uuid pattern")
});

/// How to pull an identifier out of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// The last delimiter-separated segment.
    #[default]
    Suffix,
    /// The first UUID-shaped substring anywhere in the key.
    Pattern,
}

impl IdStrategy {
    pub fn extract<'a>(&self, key: &'a str) -> Option<&'a str> {
        match self {
            IdStrategy::Suffix => extract_by_suffix(key),
            IdStrategy::Pattern => extract_by_pattern(key),
        }
    }
}

/// Return the final `:`-separated segment, or `None` if the key has no delimiter.
pub fn extract_by_suffix(key: &str) -> Option<&str> {
    key.rsplit_once(KEY_DELIMITER).map(|(_, last)| last)
}

/// Return the first 8-4-4-4-12 hex substring of `key`, verbatim.
pub fn extract_by_pattern(key: &str) -> Option<&str> {
    UUID_RE.find(key).map(|m| m.as_str())
}

/// The first segment of a key (`node`, `instance`, `performance`, ...).
pub fn namespace(key: &str) -> &str {
    key.split(KEY_DELIMITER).next().unwrap_or(key)
}

/// Whether `key` is a change-marker key rather than an entity.
pub fn is_marker_key(key: &str) -> bool {
    key.ends_with(LAST_UPDATE_SUFFIX)
}
