//! Live session recording
//!
//! A [`ReplaySession`] is opened when a live recording starts, grows by one
//! frame per incoming reading, and is consumed exactly once by
//! [`ReplayRecorder::finalize`], which decides whether the ball was balanced.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::balance::longest_run;
use super::frame::{Frame, Gains};
use crate::consts::FRAME_RATE;
use crate::platform::{datetime_human, epoch_millis};
use crate::settings::{
    Group, UnitSettings, deserialize_group, deserialize_unit_number, unknown_unit_number,
};

/// An open live recording
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySession {
    pub gains: Gains,
    pub started_at: DateTime<FixedOffset>,
    pub unit: UnitSettings,
    /// In arrival order
    pub frames: Vec<Frame>,
}

impl ReplaySession {
    pub fn new(gains: Gains, unit: UnitSettings, started_at: DateTime<FixedOffset>) -> Self {
        Self {
            gains,
            started_at,
            unit,
            frames: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// A finalized session, in the shape the collector stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedReplay {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    /// Session start, milliseconds since the epoch
    pub datetime: i64,
    pub datetime_human: String,
    #[serde(default = "unknown_unit_number", deserialize_with = "deserialize_unit_number")]
    pub unit_number: i64,
    #[serde(default, deserialize_with = "deserialize_group")]
    pub group: Option<Group>,
    #[serde(default = "default_framerate")]
    pub framerate: u32,
    pub frames: Vec<Frame>,
    #[serde(default)]
    pub balanced: bool,
}

fn default_framerate() -> u32 {
    FRAME_RATE
}

impl FinishedReplay {
    pub fn gains(&self) -> Gains {
        Gains::new(self.p, self.i, self.d)
    }
}

/// Appends frames and decides the balanced verdict
#[derive(Debug, Clone, Copy)]
pub struct ReplayRecorder {
    balance_frames: u32,
}

impl Default for ReplayRecorder {
    fn default() -> Self {
        Self::new(crate::balance_frames(crate::consts::BALANCE_SECONDS, FRAME_RATE))
    }
}

impl ReplayRecorder {
    /// A zero window is raised to one frame
    pub fn new(balance_frames: u32) -> Self {
        Self {
            balance_frames: balance_frames.max(1),
        }
    }

    pub fn balance_frames(&self) -> u32 {
        self.balance_frames
    }

    #[inline]
    pub fn append_frame(&self, session: &mut ReplaySession, frame: Frame) {
        session.frames.push(frame);
    }

    /// Whether some contiguous run of in-band frames spans a full window
    pub fn is_balanced(&self, frames: &[Frame]) -> bool {
        longest_run(frames.iter().map(|f| f.s)) >= self.balance_frames
    }

    /// Close the session and produce the replay to hand off
    pub fn finalize(&self, session: ReplaySession) -> FinishedReplay {
        let balanced = self.is_balanced(&session.frames);
        log::info!(
            "Recording finalized: {} frames, balanced={}",
            session.frames.len(),
            balanced
        );

        FinishedReplay {
            p: session.gains.p,
            i: session.gains.i,
            d: session.gains.d,
            datetime: epoch_millis(&session.started_at),
            datetime_human: datetime_human(&session.started_at),
            unit_number: session.unit.unit_number,
            group: session.unit.group,
            framerate: FRAME_RATE,
            frames: session.frames,
            balanced,
        }
    }
}
