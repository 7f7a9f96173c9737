//! Anomaly models behind a single predict capability.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use edgescope_core::config::{DetectorConfig, ModelKind};

use crate::features::Features;

/// Verdict for one cycle. Either field may be absent when a model cannot
/// produce it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PredictionResult {
    pub is_anomaly: Option<bool>,
    pub anomaly_score: Option<f64>,
}

impl PredictionResult {
    pub fn is_empty(&self) -> bool {
        self.is_anomaly.is_none() && self.anomaly_score.is_none()
    }
}

pub trait Predictor: Send {
    fn name(&self) -> &'static str;

    fn predict(&mut self, features: &Features) -> anyhow::Result<PredictionResult>;
}

/// The models edgescope ships with. Neither is a real detector: `RandomBinary`
/// flips a coin so the write-back path can be exercised end to end.
pub enum AnomalyModel {
    Disabled,
    RandomBinary(StdRng),
}

impl std::fmt::Debug for AnomalyModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl AnomalyModel {
    pub fn from_config(config: &DetectorConfig) -> Self {
        match config.model {
            ModelKind::Disabled => AnomalyModel::Disabled,
            ModelKind::RandomBinary => AnomalyModel::random_binary(config.seed),
        }
    }

    pub fn random_binary(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        AnomalyModel::RandomBinary(rng)
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, AnomalyModel::Disabled)
    }
}

impl Predictor for AnomalyModel {
    fn name(&self) -> &'static str {
        match self {
            AnomalyModel::Disabled => "disabled",
            AnomalyModel::RandomBinary(_) => "random_binary",
        }
    }

    fn predict(&mut self, _features: &Features) -> anyhow::Result<PredictionResult> {
        match self {
            AnomalyModel::Disabled => Ok(PredictionResult::default()),
            AnomalyModel::RandomBinary(rng) => Ok(PredictionResult {
                is_anomaly: Some(rng.gen_bool(0.5)),
                anomaly_score: Some(f64::from(rng.gen_range(0u8..=1))),
            }),
        }
    }
}
