//! Verdict write-back to the proxy store.

use edgescope_store::{ProxyStore, StoreResult};

use crate::model::PredictionResult;

/// Writes verdicts under `<prefix>:is_anomaly` and `<prefix>:anomaly_score`.
#[derive(Debug, Clone)]
pub struct VerdictWriter {
    prefix: String,
}

impl VerdictWriter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn is_anomaly_key(&self) -> String {
        format!("{}:is_anomaly", self.prefix)
    }

    pub fn anomaly_score_key(&self) -> String {
        format!("{}:anomaly_score", self.prefix)
    }

    /// Write every present field. Returns the number of keys written.
    pub fn write<S: ProxyStore + ?Sized>(
        &self,
        store: &mut S,
        verdict: &PredictionResult,
    ) -> StoreResult<usize> {
        let mut written = 0;
        if let Some(is_anomaly) = verdict.is_anomaly {
            store.set(&self.is_anomaly_key(), if is_anomaly { "true" } else { "false" })?;
            written += 1;
        }
        if let Some(score) = verdict.anomaly_score {
            store.set(&self.anomaly_score_key(), &score.to_string())?;
            written += 1;
        }
        Ok(written)
    }
}
