//! Error types for playback, catalog and scheduling operations.

use thiserror::Error;

/// Errors raised by the playback core.
///
/// None of these are fatal: callers either show a notice or drop the event.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Simulation requested before any dataset was loaded.
    #[error("no simulation data loaded")]
    CatalogEmpty,

    /// No dataset matched the requested gain.
    #[error("no simulation data for gain {gain}")]
    CatalogMiss { gain: f64 },

    /// One archive entry could not be parsed; the rest of the load continues.
    #[error("malformed dataset entry {key:?}: {reason}")]
    MalformedDatasetEntry { key: String, reason: String },

    /// A playback tick woke after its session ended.
    #[error("stale playback tick")]
    StaleTick,

    /// Simulation requested while a live recording is open.
    #[error("a live recording is in progress")]
    RecordingInProgress,

    /// The simulation archive is not valid JSON.
    #[error("invalid simulation archive: {0}")]
    Json(#[from] serde_json::Error),
}
