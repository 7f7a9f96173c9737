//! Per-cycle output consumers.

use std::collections::HashSet;

use tracing::{debug, info};

use edgescope_core::{EnrichedRecord, NodeHealthSample, Timestamp};

/// Everything one polling cycle produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOutput {
    pub node_health: Vec<NodeHealthSample>,
    pub enriched: Vec<EnrichedRecord>,
}

impl CycleOutput {
    pub fn is_empty(&self) -> bool {
        self.node_health.is_empty() && self.enriched.is_empty()
    }
}

/// Receives each cycle's output. A failing sink is logged and skipped; it
/// never fails the cycle.
pub trait Sink: Send {
    fn name(&self) -> &str;

    fn emit(&mut self, output: &CycleOutput) -> anyhow::Result<()>;
}

/// Logs a one-line summary of each cycle.
#[derive(Debug, Default)]
pub struct SummarySink {
    cycles: u64,
}

impl SummarySink {
    pub fn new() -> Self {
        Self::default()
    }
}

fn time_range(timestamps: impl Iterator<Item = Timestamp>) -> Option<(Timestamp, Timestamp)> {
    timestamps.fold(None, |range, ts| match range {
        None => Some((ts, ts)),
        Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
    })
}

impl Sink for SummarySink {
    fn name(&self) -> &str {
        "summary"
    }

    fn emit(&mut self, output: &CycleOutput) -> anyhow::Result<()> {
        self.cycles += 1;
        if output.is_empty() {
            info!(cycle = self.cycles, "no data available");
            return Ok(());
        }

        let nodes: HashSet<&str> = output
            .node_health
            .iter()
            .map(|s| s.node_uuid.as_str())
            .collect();
        let functions: HashSet<&str> = output
            .enriched
            .iter()
            .map(|r| r.physical_uuid.as_str())
            .collect();
        let attributed = output.enriched.iter().filter(|r| r.is_attributed()).count();

        info!(
            cycle = self.cycles,
            nodes = nodes.len(),
            health_samples = output.node_health.len(),
            functions = functions.len(),
            records = output.enriched.len(),
            attributed,
            "cycle summary"
        );
        if let Some((from, to)) = time_range(output.node_health.iter().map(|s| s.timestamp)) {
            debug!(from, to, "node health time range");
        }
        if let Some((from, to)) = time_range(output.enriched.iter().map(|r| r.timestamp)) {
            debug!(from, to, "performance time range");
        }
        Ok(())
    }
}
