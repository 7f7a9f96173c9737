//! Sliding-window reads of time-series keys, and their decoding.
//!
//! Every series key is a sorted set scored by sample timestamp. A fetch
//! lists the keys matching a pattern and range-reads each one over
//! `[now - window, now]`.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use edgescope_core::decode::{decode_node_health, decode_performance_entry};
use edgescope_core::keys::is_marker_key;
use edgescope_core::{
    EntityKey, IdStrategy, MeasurementType, NodeHealthSample, PerformanceSample, ScoredValues,
    TimeWindow,
};
use edgescope_store::ProxyStore;

use crate::error::FetchError;

/// Samples per key, ascending by timestamp. Keys without samples are absent.
pub type WindowSamples = BTreeMap<EntityKey, ScoredValues>;

/// Fetch samples in the window ending now.
pub fn fetch_window<S: ProxyStore + ?Sized>(
    store: &mut S,
    pattern: &str,
    window_secs: f64,
) -> Result<WindowSamples, FetchError> {
    fetch_window_at(store, pattern, TimeWindow::ending_now(window_secs))
}

/// Fetch samples in an explicit window.
///
/// A failure on one key is logged and the key omitted. Only a failure to
/// list the keys fails the whole fetch.
pub fn fetch_window_at<S: ProxyStore + ?Sized>(
    store: &mut S,
    pattern: &str,
    window: TimeWindow,
) -> Result<WindowSamples, FetchError> {
    let keys = store
        .keys_matching(pattern)
        .map_err(|source| FetchError::Listing {
            pattern: pattern.to_string(),
            source,
        })?;

    let mut out = WindowSamples::new();
    for key in keys.into_iter().filter(|k| !is_marker_key(k)) {
        match store.range_by_score(&key, window.cutoff, window.now) {
            Ok(members) => {
                let members: ScoredValues = members
                    .into_iter()
                    .filter(|(_, ts)| window.contains(*ts))
                    .collect();
                if !members.is_empty() {
                    out.insert(key, members);
                }
            }
            Err(e) => warn!(%key, error = %e, "failed to read series key"),
        }
    }

    debug!(
        pattern,
        keys = out.len(),
        samples = out.values().map(Vec::len).sum::<usize>(),
        "window fetched"
    );
    Ok(out)
}

/// Decoded samples plus the number of entries that failed to decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub samples: Vec<T>,
    pub rejected: usize,
}

impl<T> Default for Decoded<T> {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            rejected: 0,
        }
    }
}

impl<T> Decoded<T> {
    pub fn extend(&mut self, other: Decoded<T>) {
        self.samples.extend(other.samples);
        self.rejected += other.rejected;
    }
}

/// Decode node health readings. The node UUID comes from the key.
pub fn decode_health_window(
    window: &WindowSamples,
    strategy: IdStrategy,
) -> Decoded<NodeHealthSample> {
    let mut out = Decoded::default();
    for (key, members) in window {
        let Some(node_uuid) = strategy.extract(key) else {
            warn!(%key, "no node identifier in health key");
            out.rejected += members.len();
            continue;
        };
        for (raw, timestamp) in members {
            match decode_node_health(raw) {
                Ok(metrics) => out.samples.push(NodeHealthSample {
                    timestamp: *timestamp,
                    node_uuid: node_uuid.to_string(),
                    metrics,
                }),
                Err(e) => {
                    debug!(%key, error = %e, "skipping health sample");
                    out.rejected += 1;
                }
            }
        }
    }
    out
}

/// Decode performance entries. The physical UUID comes from the key.
pub fn decode_performance_window(
    window: &WindowSamples,
    strategy: IdStrategy,
    measurement_type: MeasurementType,
) -> Decoded<PerformanceSample> {
    let mut out = Decoded::default();
    for (key, members) in window {
        let Some(physical_uuid) = strategy.extract(key) else {
            warn!(%key, "no function identifier in performance key");
            out.rejected += members.len();
            continue;
        };
        for (raw, timestamp) in members {
            match decode_performance_entry(raw) {
                Ok(value) => out.samples.push(PerformanceSample {
                    timestamp: *timestamp,
                    physical_uuid: physical_uuid.to_string(),
                    measurement_type,
                    value,
                }),
                Err(e) => {
                    debug!(%key, error = %e, "skipping performance sample");
                    out.rejected += 1;
                }
            }
        }
    }
    out
}
