//! Collection loop — polls the proxy store once per period.
//!
//! ```text
//! Idle → Connecting → Polling → Sleeping → Polling → … → Stopped
//! ```
//!
//! Store calls are blocking and issued one at a time from the loop; the
//! loop only yields while sleeping between cycles.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use edgescope_core::{EdgescopeConfig, SeriesKind, StaticKind};
use edgescope_detect::Detector;
use edgescope_store::ProxyStore;

use crate::cache::StaticEntityCache;
use crate::correlate::{correlate, decode_instances};
use crate::error::{ConnectError, CycleError};
use crate::sink::{CycleOutput, Sink};
use crate::window::{Decoded, decode_health_window, decode_performance_window, fetch_window};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Connecting,
    Polling,
    Sleeping,
    Stopped,
}

/// How long to sleep after a cycle that took `elapsed`.
///
/// A successful cycle keeps the period between cycle starts; a failed one
/// waits the full period.
pub fn next_wait(period: Duration, elapsed: Duration, succeeded: bool) -> Duration {
    if succeeded {
        period.saturating_sub(elapsed)
    } else {
        period
    }
}

pub struct Collector<S: ProxyStore> {
    store: S,
    config: EdgescopeConfig,
    target: String,
    cache: StaticEntityCache,
    sinks: Vec<Box<dyn Sink>>,
    detector: Detector,
    state: LoopState,
    completed_cycles: u64,
    failed_cycles: u64,
}

impl<S: ProxyStore> Collector<S> {
    pub fn new(store: S, config: EdgescopeConfig) -> Self {
        let detector = Detector::from_config(&config.detector);
        Self {
            store,
            target: config.store.target(),
            config,
            cache: StaticEntityCache::new(),
            sinks: Vec::new(),
            detector,
            state: LoopState::Idle,
            completed_cycles: 0,
            failed_cycles: 0,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_detector(mut self, detector: Detector) -> Self {
        self.detector = detector;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles
    }

    pub fn failed_cycles(&self) -> u64 {
        self.failed_cycles
    }

    pub fn cache(&self) -> &StaticEntityCache {
        &self.cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Verify the store is live. Failure is fatal.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        self.state = LoopState::Connecting;
        if let Err(source) = self.store.ping() {
            self.state = LoopState::Stopped;
            return Err(ConnectError {
                target: self.target.clone(),
                source,
            });
        }
        info!(store = %self.target, "connected to proxy store");

        match self.store.get(&self.config.keys.domain_id) {
            Ok(Some(domain)) => info!(%domain, "orchestration domain"),
            Ok(None) => warn!(key = %self.config.keys.domain_id, "no orchestration domain id found"),
            Err(e) => warn!(error = %e, "failed to read orchestration domain id"),
        }
        Ok(())
    }

    /// One polling cycle: static refresh, window fetch, correlation, sinks,
    /// then scoring.
    pub fn poll_once(&mut self) -> Result<CycleOutput, CycleError> {
        let keys = &self.config.keys;
        let window_secs = self.config.collector.window_secs;

        self.cache.refresh_all(&mut self.store, keys);

        let mut node_health = Decoded::default();
        let mut performance = Decoded::default();
        let mut listed = 0;
        let mut last_failure = None;
        for kind in SeriesKind::ALL {
            let series = keys.series_kind(kind);
            let window = match fetch_window(&mut self.store, &series.pattern, window_secs) {
                Ok(window) => window,
                Err(e) => {
                    warn!(%kind, error = %e, "series unavailable this cycle");
                    last_failure = Some((kind, e));
                    continue;
                }
            };
            listed += 1;
            match kind.measurement_type() {
                None => node_health.extend(decode_health_window(&window, series.id_strategy)),
                Some(measurement) => performance.extend(decode_performance_window(
                    &window,
                    series.id_strategy,
                    measurement,
                )),
            }
        }
        if listed == 0 {
            if let Some((kind, source)) = last_failure {
                return Err(CycleError::StoreUnavailable { kind, source });
            }
        }

        let instances = decode_instances(
            self.cache.data(StaticKind::Instance),
            keys.instance.id_strategy,
        );
        let decoded_performance = performance.samples.len();
        let health = self
            .config
            .collector
            .enrich_with_health
            .then_some(node_health.samples.as_slice());
        let (enriched, stats) = correlate(&instances.records, performance.samples, health);

        debug!(
            instances = instances.records.len(),
            health_samples = node_health.samples.len(),
            health_rejected = node_health.rejected,
            performance_samples = decoded_performance,
            performance_rejected = performance.rejected,
            attributed = stats.attributed,
            unattributed = stats.unattributed,
            with_health = stats.with_health,
            "cycle correlated"
        );
        if performance.rejected > 0 {
            warn!(
                count = performance.rejected,
                "performance samples excluded after decode failures"
            );
        }

        let output = CycleOutput {
            node_health: node_health.samples,
            enriched,
        };

        self.emit(&output);
        self.detector
            .evaluate(&mut self.store, &output.node_health, &output.enriched);

        Ok(output)
    }

    fn emit(&mut self, output: &CycleOutput) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.emit(output) {
                warn!(sink = sink.name(), error = %e, "sink failed");
            }
        }
    }

    /// Connect, then poll until `shutdown` turns true.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConnectError> {
        self.connect()?;

        let period = self.config.collector.period();
        info!(
            period_secs = period.as_secs_f64(),
            window_secs = self.config.collector.window_secs,
            enrich_with_health = self.config.collector.enrich_with_health,
            "collector started"
        );

        'poll: loop {
            if *shutdown.borrow() {
                break;
            }

            self.state = LoopState::Polling;
            let started = Instant::now();
            let succeeded = match self.poll_once() {
                Ok(_) => {
                    self.completed_cycles += 1;
                    true
                }
                Err(e) => {
                    self.failed_cycles += 1;
                    error!(error = %e, "collection cycle failed, backing off");
                    self.emit(&CycleOutput::default());
                    false
                }
            };
            let deadline = Instant::now() + next_wait(period, started.elapsed(), succeeded);

            if *shutdown.borrow() {
                break;
            }
            self.state = LoopState::Sleeping;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break 'poll;
                        }
                    }
                }
            }
        }

        info!(
            completed = self.completed_cycles,
            failed = self.failed_cycles,
            "collector shutting down"
        );
        self.state = LoopState::Stopped;
        self.store.close();
        Ok(())
    }
}
