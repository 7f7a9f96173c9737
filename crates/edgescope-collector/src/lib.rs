//! edgescope-collector — the metrics collection, caching and correlation pipeline.
//!
//! # Architecture
//!
//! ```text
//! Collector::run()
//!   └── poll_once()
//!         ├── StaticEntityCache::refresh_all()  ← skipped per kind while the marker is unchanged
//!         ├── fetch_window() × 3                ← node health, execution time, transfer time
//!         ├── correlate()                       → Vec<EnrichedRecord>, sorted by timestamp
//!         ├── Sink::emit()                      → CycleOutput to every sink
//!         └── Detector::evaluate()              → optional verdict written back to the store
//! ```

pub mod cache;
pub mod collector;
pub mod correlate;
pub mod error;
pub mod sink;
pub mod window;

pub use cache::{CacheEntry, RefreshOutcome, StaticEntityCache};
pub use collector::{Collector, LoopState};
pub use correlate::{CorrelationStats, correlate, decode_instances};
pub use error::{ConnectError, CycleError, FetchError};
pub use sink::{CycleOutput, Sink, SummarySink};
pub use window::{WindowSamples, fetch_window, fetch_window_at};
