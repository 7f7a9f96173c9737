//! edgescope-detect — anomaly scoring hook for collection cycles.
//!
//! # Architecture
//!
//! ```text
//! Detector::evaluate(store, health, enriched)
//!   ├── prepare_features()     → six cycle aggregates, None if empty
//!   ├── Predictor::predict()   → PredictionResult { is_anomaly, anomaly_score }
//!   └── VerdictWriter::write() → SET <prefix>:is_anomaly / <prefix>:anomaly_score
//! ```
//!
//! Scoring failures never fail a cycle; they are logged and the cycle
//! proceeds without a verdict.

pub mod features;
pub mod model;
pub mod verdict;

pub use features::{Features, prepare_features};
pub use model::{AnomalyModel, PredictionResult, Predictor};
pub use verdict::VerdictWriter;

use tracing::{debug, info, warn};

use edgescope_core::config::DetectorConfig;
use edgescope_core::{EnrichedRecord, NodeHealthSample};
use edgescope_store::ProxyStore;

/// A model paired with the writer that publishes its verdicts.
pub struct Detector {
    model: Box<dyn Predictor>,
    enabled: bool,
    writer: VerdictWriter,
}

impl Detector {
    pub fn from_config(config: &DetectorConfig) -> Self {
        let model = AnomalyModel::from_config(config);
        let enabled = model.is_enabled();
        Self {
            model: Box::new(model),
            enabled,
            writer: VerdictWriter::new(config.verdict_prefix.clone()),
        }
    }

    /// A detector that never scores.
    pub fn disabled() -> Self {
        Self::from_config(&DetectorConfig::default())
    }

    /// Use a custom predictor.
    pub fn with_predictor(model: Box<dyn Predictor>, writer: VerdictWriter) -> Self {
        Self {
            model,
            enabled: true,
            writer,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Score one cycle and write the verdict back.
    pub fn evaluate<S: ProxyStore + ?Sized>(
        &mut self,
        store: &mut S,
        health: &[NodeHealthSample],
        enriched: &[EnrichedRecord],
    ) -> Option<PredictionResult> {
        if !self.enabled {
            return None;
        }
        let Some(features) = prepare_features(health, enriched) else {
            debug!("no data available for inference");
            return None;
        };

        let verdict = match self.model.predict(&features) {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(model = self.model.name(), error = %e, "prediction failed");
                return None;
            }
        };

        if let Some(true) = verdict.is_anomaly {
            warn!(model = self.model.name(), score = ?verdict.anomaly_score, "anomaly detected");
        } else {
            info!(model = self.model.name(), score = ?verdict.anomaly_score, "no anomaly detected");
        }

        if let Err(e) = self.writer.write(store, &verdict) {
            warn!(error = %e, "failed to write anomaly verdict");
        }
        Some(verdict)
    }
}
