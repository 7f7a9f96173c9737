//! edgescope-core — shared types for the edgescope telemetry pipeline.
//!
//! Holds the domain records read from the orchestrator's proxy store, the
//! key parser and payload decoders that produce them, and the
//! `edgescope.toml` configuration model.

pub mod config;
pub mod decode;
pub mod error;
pub mod keys;
pub mod types;

pub use config::EdgescopeConfig;
pub use error::{ConfigError, DecodeError};
pub use keys::IdStrategy;
pub use types::*;
