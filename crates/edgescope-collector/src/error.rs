use thiserror::Error;

use edgescope_core::SeriesKind;
use edgescope_store::StoreError;

/// The store could not be reached at startup. Not retried.
#[derive(Debug, Error)]
#[error("proxy store unreachable at {target}: {source}")]
pub struct ConnectError {
    pub target: String,
    #[source]
    pub source: StoreError,
}

/// A store read that failed for one key or listing.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("listing keys matching {pattern}: {source}")]
    Listing {
        pattern: String,
        #[source]
        source: StoreError,
    },

    #[error("reading marker {key}: {source}")]
    Marker {
        key: String,
        #[source]
        source: StoreError,
    },
}

/// A failure that leaves one polling cycle with nothing to report. Sinks
/// receive an empty output and the loop backs off for a full period.
#[derive(Debug, Error)]
pub enum CycleError {
    /// No series kind could be listed, so the store is most likely gone.
    #[error("no series could be listed, last failure on {kind}: {source}")]
    StoreUnavailable {
        kind: SeriesKind,
        #[source]
        source: FetchError,
    },
}
