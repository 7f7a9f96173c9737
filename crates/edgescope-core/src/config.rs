//! edgescope.toml configuration parser.
//!
//! Every section is optional; a missing section takes the defaults that
//! match the orchestrator's proxy key layout.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::keys::IdStrategy;
use crate::types::{SeriesKind, StaticKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgescopeConfig {
    pub store: StoreConfig,
    pub collector: CollectorConfig,
    pub keys: KeysConfig,
    pub detector: DetectorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    pub tls: bool,
    pub connect_timeout_secs: f64,
    pub io_timeout_secs: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            password: None,
            tls: false,
            connect_timeout_secs: 5.0,
            io_timeout_secs: 5.0,
        }
    }
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.connect_timeout_secs).unwrap_or(Duration::from_secs(5))
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.io_timeout_secs).unwrap_or(Duration::from_secs(5))
    }

    /// Human-readable target for logs (never includes the password).
    pub fn target(&self) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        format!("{scheme}://{}:{}/{}", self.host, self.port, self.db)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Seconds between the start of consecutive polling cycles.
    pub period_secs: f64,
    /// Length of the trailing sample window in seconds.
    pub window_secs: f64,
    /// Attach last-known node health to enriched records.
    pub enrich_with_health: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            period_secs: 5.0,
            window_secs: 1800.0,
            enrich_with_health: true,
        }
    }
}

impl CollectorConfig {
    pub fn period(&self) -> Duration {
        Duration::try_from_secs_f64(self.period_secs).unwrap_or(Duration::from_secs(5))
    }
}

/// Key layout of a slowly-changing entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticKeyConfig {
    /// Glob pattern listing the entity keys.
    pub pattern: String,
    /// Key holding the change marker for the whole kind.
    pub marker: String,
    #[serde(default)]
    pub id_strategy: IdStrategy,
}

/// Key layout of a time-series kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesKeyConfig {
    pub pattern: String,
    #[serde(default)]
    pub id_strategy: IdStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Key holding the orchestration domain identifier.
    pub domain_id: String,
    pub node_capabilities: StaticKeyConfig,
    pub instance: StaticKeyConfig,
    pub dependency: StaticKeyConfig,
    pub node_health: SeriesKeyConfig,
    pub execution_time: SeriesKeyConfig,
    pub transfer_time: SeriesKeyConfig,
}

impl Default for KeysConfig {
    fn default() -> Self {
        let static_kind = |prefix: &str| StaticKeyConfig {
            pattern: format!("{prefix}:*"),
            marker: format!("{prefix}:last_update"),
            id_strategy: IdStrategy::Suffix,
        };
        Self {
            domain_id: "domain_info:domain_id".to_string(),
            node_capabilities: static_kind("node:capabilities"),
            instance: static_kind("instance"),
            dependency: static_kind("dependency"),
            node_health: SeriesKeyConfig {
                pattern: "node:health:*".to_string(),
                id_strategy: IdStrategy::Suffix,
            },
            execution_time: SeriesKeyConfig {
                pattern: "performance:*:function_execution_time".to_string(),
                id_strategy: IdStrategy::Pattern,
            },
            transfer_time: SeriesKeyConfig {
                pattern: "performance:*:function_transfer_time".to_string(),
                id_strategy: IdStrategy::Pattern,
            },
        }
    }
}

impl KeysConfig {
    pub fn static_kind(&self, kind: StaticKind) -> &StaticKeyConfig {
        match kind {
            StaticKind::NodeCapabilities => &self.node_capabilities,
            StaticKind::Instance => &self.instance,
            StaticKind::Dependency => &self.dependency,
        }
    }

    pub fn series_kind(&self, kind: SeriesKind) -> &SeriesKeyConfig {
        match kind {
            SeriesKind::NodeHealth => &self.node_health,
            SeriesKind::ExecutionTime => &self.execution_time,
            SeriesKind::TransferTime => &self.transfer_time,
        }
    }
}

/// Which anomaly model scores each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Disabled,
    RandomBinary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: ModelKind,
    /// Seed for placeholder models; random when unset.
    pub seed: Option<u64>,
    /// Namespace the verdict keys are written under.
    pub verdict_prefix: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::Disabled,
            seed: None,
            verdict_prefix: "anomaly_detection".to_string(),
        }
    }
}

impl EdgescopeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EdgescopeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the collection loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{name} must be a positive number of seconds, got {v}")))
            }
        };
        positive("collector.period_secs", self.collector.period_secs)?;
        positive("collector.window_secs", self.collector.window_secs)?;
        positive("store.connect_timeout_secs", self.store.connect_timeout_secs)?;
        positive("store.io_timeout_secs", self.store.io_timeout_secs)?;

        if self.store.port == 0 {
            return Err(ConfigError::Invalid("store.port must not be 0".to_string()));
        }
        if self.store.host.trim().is_empty() {
            return Err(ConfigError::Invalid("store.host must not be empty".to_string()));
        }

        for kind in StaticKind::ALL {
            let keys = self.keys.static_kind(kind);
            if keys.pattern.is_empty() || keys.marker.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "keys.{kind} needs both a pattern and a marker"
                )));
            }
        }
        for kind in SeriesKind::ALL {
            if self.keys.series_kind(kind).pattern.is_empty() {
                return Err(ConfigError::Invalid(format!("keys.{kind} needs a pattern")));
            }
        }
        if self.detector.verdict_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "detector.verdict_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
