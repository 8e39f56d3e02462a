//! Platform abstraction layer
//!
//! Handles browser/native differences for:
//! - Wall-clock time used to stamp replays and telemetry

pub mod time;

pub use time::{Clock, FixedClock, SystemClock, datetime_human, epoch_millis};
