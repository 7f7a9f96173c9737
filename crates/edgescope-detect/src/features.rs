//! Feature vector preparation.
//!
//! A cycle's output is summarised into six coarse aggregates, enough for a
//! placeholder model to consume. Health first, then performance:
//!
//! | index | feature |
//! |---|---|
//! | 0 | health sample count |
//! | 1 | distinct nodes reporting health |
//! | 2 | health time span (seconds) |
//! | 3 | performance record count |
//! | 4 | distinct physical functions |
//! | 5 | performance time span (seconds) |

use std::collections::HashSet;

use edgescope_core::{EnrichedRecord, NodeHealthSample, Timestamp};

pub const FEATURE_COUNT: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct Features(pub [f64; FEATURE_COUNT]);

impl Features {
    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

fn span(timestamps: impl Iterator<Item = Timestamp>) -> f64 {
    let (min, max) = timestamps.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), ts| {
        (lo.min(ts), hi.max(ts))
    });
    if min.is_finite() && max.is_finite() {
        max - min
    } else {
        0.0
    }
}

/// Summarise a cycle. Returns `None` when there is nothing to score.
pub fn prepare_features(
    health: &[NodeHealthSample],
    enriched: &[EnrichedRecord],
) -> Option<Features> {
    let nodes: HashSet<&str> = health.iter().map(|s| s.node_uuid.as_str()).collect();
    let functions: HashSet<&str> = enriched.iter().map(|r| r.physical_uuid.as_str()).collect();

    let features = Features([
        health.len() as f64,
        nodes.len() as f64,
        span(health.iter().map(|s| s.timestamp)),
        enriched.len() as f64,
        functions.len() as f64,
        span(enriched.iter().map(|r| r.timestamp)),
    ]);

    if features.0.iter().all(|v| *v == 0.0) {
        None
    } else {
        Some(features)
    }
}
