//! Shared types used across edgescope crates.
//!
//! These types describe what the pipeline reads out of the orchestrator's
//! proxy store (instances, node health readings, performance samples) and
//! what it produces (enriched performance records). All are serializable so
//! that sinks can forward them as JSON without an intermediate model.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A key in the proxy store, e.g. `node:health:{uuid}`.
pub type EntityKey = String;

/// Opaque identifier extracted from an [`EntityKey`].
pub type Identifier = String;

/// Seconds since the Unix epoch (fractional).
pub type Timestamp = f64;

/// Open metric map for a single node health reading.
///
/// The metric set is not fixed: metrics missing from a payload are absent
/// from the map rather than defaulted.
pub type HealthMetrics = BTreeMap<String, f64>;

/// Members of a sorted-set key paired with their scores, ascending by score.
pub type ScoredValues = Vec<(String, Timestamp)>;

// ── Entity kinds ───────────────────────────────────────────────────

/// Slowly-changing entity kinds, refreshed only when their marker changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticKind {
    NodeCapabilities,
    Instance,
    Dependency,
}

impl StaticKind {
    pub const ALL: [StaticKind; 3] = [
        StaticKind::NodeCapabilities,
        StaticKind::Instance,
        StaticKind::Dependency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StaticKind::NodeCapabilities => "node_capabilities",
            StaticKind::Instance => "instance",
            StaticKind::Dependency => "dependency",
        }
    }
}

impl fmt::Display for StaticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-series entity kinds, re-read over the sliding window every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    NodeHealth,
    ExecutionTime,
    TransferTime,
}

impl SeriesKind {
    pub const ALL: [SeriesKind; 3] = [
        SeriesKind::NodeHealth,
        SeriesKind::ExecutionTime,
        SeriesKind::TransferTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::NodeHealth => "node_health",
            SeriesKind::ExecutionTime => "execution_time",
            SeriesKind::TransferTime => "transfer_time",
        }
    }

    /// The measurement carried by a performance series, `None` for node health.
    pub fn measurement_type(&self) -> Option<MeasurementType> {
        match self {
            SeriesKind::NodeHealth => None,
            SeriesKind::ExecutionTime => Some(MeasurementType::ExecutionTime),
            SeriesKind::TransferTime => Some(MeasurementType::TransferTime),
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a performance sample measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementType {
    ExecutionTime,
    TransferTime,
}

impl MeasurementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementType::ExecutionTime => "execution_time",
            MeasurementType::TransferTime => "transfer_time",
        }
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Records ────────────────────────────────────────────────────────

/// One physical placement of a logical function.
///
/// A logical function replicated three times yields three records sharing
/// `logical_uuid`, `workflow_uuid` and `class_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub logical_uuid: Identifier,
    pub physical_uuid: Identifier,
    pub node_uuid: Identifier,
    pub workflow_uuid: Identifier,
    pub class_id: Identifier,
}

/// A point-in-time node health reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeHealthSample {
    pub timestamp: Timestamp,
    pub node_uuid: Identifier,
    pub metrics: HealthMetrics,
}

impl NodeHealthSample {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// A single execution or transfer duration reported for a physical instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub timestamp: Timestamp,
    pub physical_uuid: Identifier,
    pub measurement_type: MeasurementType,
    pub value: f64,
}

/// Node health attached to an enriched record (last known reading).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthContext {
    /// Timestamp of the health reading, never after the performance sample.
    pub timestamp: Timestamp,
    pub metrics: HealthMetrics,
}

/// A performance sample joined with instance metadata and, optionally,
/// node health context.
///
/// Instance-derived fields are `None` when no instance matched the sample's
/// physical UUID; the observation itself is always kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub timestamp: Timestamp,
    pub physical_uuid: Identifier,
    pub measurement_type: MeasurementType,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_uuid: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_uuid: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_uuid: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthContext>,
}

impl EnrichedRecord {
    /// A record carrying only the performance observation.
    pub fn unattributed(sample: PerformanceSample) -> Self {
        Self {
            timestamp: sample.timestamp,
            physical_uuid: sample.physical_uuid,
            measurement_type: sample.measurement_type,
            value: sample.value,
            node_uuid: None,
            logical_uuid: None,
            workflow_uuid: None,
            class_id: None,
            health: None,
        }
    }

    /// Copy the placement metadata of `instance` onto this record.
    pub fn attribute(&mut self, instance: &InstanceRecord) {
        self.node_uuid = Some(instance.node_uuid.clone());
        self.logical_uuid = Some(instance.logical_uuid.clone());
        self.workflow_uuid = Some(instance.workflow_uuid.clone());
        self.class_id = Some(instance.class_id.clone());
    }

    pub fn is_attributed(&self) -> bool {
        self.logical_uuid.is_some()
    }
}

// ── Time window ────────────────────────────────────────────────────

/// The closed interval `[cutoff, now]` over which samples are current.
///
/// Computed fresh for every fetch; two fetches in the same cycle may see
/// slightly different bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub cutoff: Timestamp,
    pub now: Timestamp,
}

impl TimeWindow {
    /// A window of `window_secs` ending at `now`.
    pub fn ending_at(now: Timestamp, window_secs: f64) -> Self {
        Self {
            cutoff: now - window_secs,
            now,
        }
    }

    /// A window of `window_secs` ending at the current wall-clock time.
    pub fn ending_now(window_secs: f64) -> Self {
        Self::ending_at(epoch_secs_f64(), window_secs)
    }

    /// Inclusive on both ends.
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.cutoff && timestamp <= self.now
    }
}

/// Wall-clock seconds since the Unix epoch, with sub-second precision.
pub fn epoch_secs_f64() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
