//! Correlation of performance samples with instance and node metadata.
//!
//! ```text
//! instance:*  ──decode──▶ InstanceRecord ─┐ physical_uuid
//! performance ──decode──▶ PerformanceSample ┴──▶ EnrichedRecord ──▶ sort by ts
//! node:health ──decode──▶ NodeHealthSample ──── node_uuid, last ts <= sample ts
//! ```

use std::collections::HashMap;

use tracing::{debug, warn};

use edgescope_core::decode::{RawInstanceEntity, decode_instance};
use edgescope_core::{
    EnrichedRecord, EntityKey, HealthContext, IdStrategy, InstanceRecord, NodeHealthSample,
    PerformanceSample,
};

/// Instance records decoded from cached `instance:*` entities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedInstances {
    pub records: Vec<InstanceRecord>,
    /// Entities that failed to decode.
    pub malformed: usize,
    /// Resource instances and other entities without function metadata.
    pub non_function: usize,
}

/// Decode every cached instance entity into per-placement records.
pub fn decode_instances<'a>(
    entities: impl IntoIterator<Item = (&'a EntityKey, &'a String)>,
    strategy: IdStrategy,
) -> DecodedInstances {
    let mut out = DecodedInstances::default();
    for (key, raw) in entities {
        let Some(logical_uuid) = strategy.extract(key) else {
            warn!(%key, "no logical identifier in instance key");
            out.malformed += 1;
            continue;
        };
        match decode_instance(raw) {
            Ok(RawInstanceEntity::Function(entity)) => {
                if entity.rejected_placements > 0 {
                    warn!(
                        %key,
                        rejected = entity.rejected_placements,
                        "ignoring unparseable placements"
                    );
                }
                out.records.extend(entity.records(logical_uuid));
            }
            Ok(RawInstanceEntity::NonFunction) => out.non_function += 1,
            Err(e) => {
                warn!(%key, error = %e, "skipping malformed instance");
                out.malformed += 1;
            }
        }
    }
    out
}

/// Per-node health readings ordered by timestamp, for last-known-value lookups.
#[derive(Debug, Default)]
pub struct HealthIndex<'a> {
    by_node: HashMap<&'a str, Vec<&'a NodeHealthSample>>,
}

impl<'a> HealthIndex<'a> {
    pub fn new(samples: &'a [NodeHealthSample]) -> Self {
        let mut by_node: HashMap<&str, Vec<&NodeHealthSample>> = HashMap::new();
        for sample in samples {
            by_node.entry(sample.node_uuid.as_str()).or_default().push(sample);
        }
        for readings in by_node.values_mut() {
            readings.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        }
        Self { by_node }
    }

    /// The latest reading of `node` taken at or before `timestamp`.
    pub fn last_known(&self, node: &str, timestamp: f64) -> Option<&'a NodeHealthSample> {
        let readings = self.by_node.get(node)?;
        let idx = readings.partition_point(|s| s.timestamp <= timestamp);
        idx.checked_sub(1).map(|i| readings[i])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationStats {
    pub attributed: usize,
    pub unattributed: usize,
    pub with_health: usize,
}

/// Join performance samples with instance records and, if `health` is
/// given, the last known health of the hosting node.
///
/// Every input sample yields exactly one output record. The output is
/// stably sorted by timestamp.
pub fn correlate(
    instances: &[InstanceRecord],
    performance: Vec<PerformanceSample>,
    health: Option<&[NodeHealthSample]>,
) -> (Vec<EnrichedRecord>, CorrelationStats) {
    let mut index: HashMap<&str, &InstanceRecord> = HashMap::with_capacity(instances.len());
    for record in instances {
        if index.insert(record.physical_uuid.as_str(), record).is_some() {
            debug!(physical = %record.physical_uuid, "duplicate placement, keeping the later one");
        }
    }
    let health = health.map(HealthIndex::new);

    let mut stats = CorrelationStats::default();
    let mut enriched: Vec<EnrichedRecord> = performance
        .into_iter()
        .map(|sample| {
            let mut record = EnrichedRecord::unattributed(sample);
            match index.get(record.physical_uuid.as_str()) {
                Some(instance) => {
                    record.attribute(instance);
                    stats.attributed += 1;
                }
                None => stats.unattributed += 1,
            }
            let reading = match (&health, record.node_uuid.as_deref()) {
                (Some(health), Some(node)) => health.last_known(node, record.timestamp),
                _ => None,
            };
            if let Some(reading) = reading {
                record.health = Some(HealthContext {
                    timestamp: reading.timestamp,
                    metrics: reading.metrics.clone(),
                });
                stats.with_health += 1;
            }
            record
        })
        .collect();

    enriched.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    (enriched, stats)
}
