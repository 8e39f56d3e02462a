//! Beam segment geometry
//!
//! The beam is a straight segment in the physical viewport (mm, y down).
//! Its right end sits on the fixed pivot at the viewport center height; the
//! left end is lifted by the motor.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::{BEAM_WIDTH, VIEWPORT_HEIGHT, VIEWPORT_WIDTH};

/// Center of the physical viewport
#[inline]
pub fn viewport_center() -> Vec2 {
    Vec2::new(VIEWPORT_WIDTH / 2.0, VIEWPORT_HEIGHT / 2.0)
}

/// A beam between its motor-driven left end and its pivoted right end
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamSegment {
    /// Left (motor) end
    pub start: Vec2,
    /// Right (pivot) end
    pub end: Vec2,
}

impl BeamSegment {
    /// Beam for a sign-flipped motor value (positive lifts the left end)
    pub fn from_motor(m: f32) -> Self {
        let center = viewport_center();
        Self {
            start: Vec2::new(center.x - BEAM_WIDTH / 2.0, center.y - m),
            end: Vec2::new(center.x + BEAM_WIDTH / 2.0, center.y),
        }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        (self.end - self.start).length()
    }

    /// Point at `distance` from the pivot end toward the motor end, lifted
    /// `clearance` off the beam on its upper side
    pub fn point_from_pivot(&self, distance: f32, clearance: f32) -> Vec2 {
        let dir = (self.start - self.end).normalize_or_zero();
        // Rotating the pivot->motor direction this way points screen-up
        let up = Vec2::new(-dir.y, dir.x);
        self.end + dir * distance + up * clearance
    }
}
