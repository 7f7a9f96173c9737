//! In-memory proxy store.
//!
//! Mirrors the subset of Redis semantics the pipeline relies on: string
//! values, sorted sets ordered by score (ties keep insertion order), glob
//! key listing, and `WRONGTYPE` errors when a key is read as the wrong
//! kind. Every operation is counted so callers can assert which store
//! round-trips a code path issued, and individual keys can be made to fail.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::ProxyStore;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Entry {
    Value(String),
    Sorted(Vec<(String, f64)>),
}

/// Number of calls issued per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get: usize,
    pub keys: usize,
    pub range: usize,
    pub set: usize,
    pub ping: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.get + self.keys + self.range + self.set + self.ping
    }
}

/// A [`ProxyStore`] backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Entry>,
    failing_keys: HashSet<String>,
    unreachable: bool,
    calls: CallCounts,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a string value, replacing whatever the key held.
    pub fn put(&mut self, key: &str, value: &str) {
        self.entries
            .insert(key.to_string(), Entry::Value(value.to_string()));
    }

    /// Add a member to a sorted set, replacing its score if already present.
    pub fn zadd(&mut self, key: &str, member: &str, score: f64) {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Sorted(Vec::new()));
        if let Entry::Value(_) = entry {
            *entry = Entry::Sorted(Vec::new());
        }
        if let Entry::Sorted(members) = entry {
            members.retain(|(m, _)| m != member);
            let at = members.partition_point(|(_, s)| *s <= score);
            members.insert(at, (member.to_string(), score));
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Make every read of `key` fail until [`MemoryStore::heal_key`].
    pub fn fail_key(&mut self, key: &str) {
        self.failing_keys.insert(key.to_string());
    }

    pub fn heal_key(&mut self, key: &str) {
        self.failing_keys.remove(key);
    }

    /// Make every operation fail, as if the connection were lost.
    pub fn set_unreachable(&mut self, unreachable: bool) {
        self.unreachable = unreachable;
    }

    pub fn calls(&self) -> CallCounts {
        self.calls
    }

    pub fn reset_calls(&mut self) {
        self.calls = CallCounts::default();
    }

    /// Current string value of `key`, without counting a call.
    pub fn peek(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(Entry::Value(v)) => Some(v),
            _ => None,
        }
    }

    fn check_reachable(&self) -> StoreResult<()> {
        if self.unreachable {
            Err(StoreError::Io("connection reset by peer".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_key(&self, key: &str) -> StoreResult<()> {
        self.check_reachable()?;
        if self.failing_keys.contains(key) {
            return Err(StoreError::Io(format!("injected failure reading {key}")));
        }
        Ok(())
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Server(format!(
        "WRONGTYPE Operation against a key holding the wrong kind of value ({key})"
    ))
}

impl ProxyStore for MemoryStore {
    fn get(&mut self, key: &str) -> StoreResult<Option<String>> {
        self.calls.get += 1;
        self.check_key(key)?;
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry::Value(v)) => Ok(Some(v.clone())),
            Some(Entry::Sorted(_)) => Err(wrong_type(key)),
        }
    }

    fn keys_matching(&mut self, pattern: &str) -> StoreResult<Vec<String>> {
        self.calls.keys += 1;
        self.check_reachable()?;
        Ok(self
            .entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect())
    }

    fn range_by_score(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StoreResult<Vec<(String, f64)>> {
        self.calls.range += 1;
        self.check_key(key)?;
        match self.entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry::Sorted(members)) => Ok(members
                .iter()
                .filter(|(_, s)| *s >= min && *s <= max)
                .cloned()
                .collect()),
            Some(Entry::Value(_)) => Err(wrong_type(key)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.calls.set += 1;
        self.check_key(key)?;
        self.put(key, value);
        Ok(())
    }

    fn ping(&mut self) -> StoreResult<()> {
        self.calls.ping += 1;
        self.check_reachable()
    }

    fn close(&mut self) {
        debug!(keys = self.entries.len(), "in-memory store closed");
    }
}

/// Redis-style glob matching supporting `*`, `?` and `\` escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // Position after the last `*` and the text index it was tried against.
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                backtrack = Some((pi + 1, ti));
                pi += 1;
                continue;
            }
            Some('?') => {
                pi += 1;
                ti += 1;
                continue;
            }
            Some('\\') if p.get(pi + 1) == Some(&t[ti]) => {
                pi += 2;
                ti += 1;
                continue;
            }
            Some(&c) if c != '\\' && c == t[ti] => {
                pi += 1;
                ti += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((star_pi, star_ti)) => {
                pi = star_pi;
                ti = star_ti + 1;
                backtrack = Some((star_pi, star_ti + 1));
            }
            None => return false,
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}
