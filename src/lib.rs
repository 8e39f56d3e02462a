//! PID Beam - ball-on-beam balancing rig visualizer
//!
//! Core modules:
//! - `sim`: Playback state machine, frame-to-geometry transform, replay recording
//! - `renderer`: WebGPU rendering of a computed scene
//! - `platform`: Clock abstraction for replay timestamps
//! - `telemetry`: Outbound click/replay messages and the transport seam
//! - `settings`: Viewer preferences and the unit tag attached to replays

#[cfg(target_arch = "wasm32")]
pub mod audio;
pub mod error;
pub mod platform;
pub mod renderer;
pub mod settings;
pub mod sim;
pub mod telemetry;

pub use error::PlaybackError;
pub use settings::{Group, Settings, SettingsProvider, StoredSettings, UnitSettings};

/// Rig and display constants
///
/// All distances are in millimeters unless stated otherwise.
pub mod consts {
    /// Length of the beam
    pub const BEAM_WIDTH: f32 = 420.0;
    /// Thickness of the beam
    pub const BEAM_HEIGHT: f32 = 8.6;
    pub const BALL_DIAMETER: f32 = 20.0;

    /// The display models a fixed physical viewport
    pub const VIEWPORT_WIDTH: f32 = 450.0;
    pub const VIEWPORT_HEIGHT: f32 = 350.0;

    /// Raw sensor readings above this are clamped
    pub const SENSOR_MAX: f32 = 1500.0;
    /// Raw sensor reading at the beam's right end
    pub const SENSOR_OFFSET: f32 = 300.0;
    /// Raw span covering the full beam length
    pub const SENSOR_SPAN: f32 = SENSOR_MAX - SENSOR_OFFSET;

    /// Inclusive raw sensor band counted as "balanced"
    pub const BALANCE_BAND_MIN: f32 = 600.0;
    pub const BALANCE_BAND_MAX: f32 = 1000.0;

    /// Render cadence (frames per second)
    pub const FRAME_RATE: u32 = 60;
    /// Default sustained-balance window (seconds)
    pub const BALANCE_SECONDS: f32 = 3.0;

    /// Free-fall extrapolation, applied per frame
    pub const FREEFALL_GRAVITY: f32 = 0.1;
    pub const FREEFALL_EXPANSION: f32 = 1.007;
}

use consts::*;

/// Map a raw sensor reading to a distance along the beam (mm from the right end)
///
/// Readings above [`SENSOR_MAX`] are clamped first.
#[inline]
pub fn sensor_to_mm(raw: f32) -> f32 {
    (raw.min(SENSOR_MAX) - SENSOR_OFFSET) * (BEAM_WIDTH / SENSOR_SPAN)
}

/// Whether a raw sensor reading lies inside the balance band
#[inline]
pub fn in_balance_band(raw: Option<f32>) -> bool {
    raw.is_some_and(|s| (BALANCE_BAND_MIN..=BALANCE_BAND_MAX).contains(&s))
}

/// Number of consecutive frames making up a balance window, never zero
#[inline]
pub fn balance_frames(seconds: f32, frame_rate: u32) -> u32 {
    ((seconds * frame_rate as f32).round() as u32).max(1)
}
