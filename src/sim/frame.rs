//! Raw rig readings and controller gains

use serde::{Deserialize, Serialize};

/// One tick of raw rig output
///
/// `m` is the motor extension, `s` the sensor distance. An absent `s`
/// (`null` on the wire) means the sensor did not detect the ball.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub m: f32,
    #[serde(default)]
    pub s: Option<f32>,
}

impl Frame {
    pub const fn new(m: f32, s: Option<f32>) -> Self {
        Self { m, s }
    }

    /// Frame with the ball detected at raw reading `s`
    pub const fn detected(m: f32, s: f32) -> Self {
        Self { m, s: Some(s) }
    }

    /// Frame where the sensor lost the ball
    pub const fn lost(m: f32) -> Self {
        Self { m, s: None }
    }

    pub fn is_detected(&self) -> bool {
        self.s.is_some()
    }
}

/// PID controller gains a session was run with
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Gains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

impl Gains {
    pub const fn new(p: f64, i: f64, d: f64) -> Self {
        Self { p, i, d }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_null_sensor_is_lost() {
        let frame: Frame = serde_json::from_str(r#"{"m": 1.5, "s": null}"#).unwrap();
        assert_eq!(frame, Frame::lost(1.5));
        assert!(!frame.is_detected());
    }

    #[test]
    fn test_frame_missing_sensor_is_lost() {
        let frame: Frame = serde_json::from_str(r#"{"m": 0}"#).unwrap();
        assert!(!frame.is_detected());
    }

    #[test]
    fn test_frame_zero_sensor_is_a_reading() {
        let frame: Frame = serde_json::from_str(r#"{"m": 0, "s": 0}"#).unwrap();
        assert_eq!(frame.s, Some(0.0));
    }

    #[test]
    fn test_frame_serializes_lost_as_null() {
        let json = serde_json::to_string(&Frame::lost(2.0)).unwrap();
        assert_eq!(json, r#"{"m":2.0,"s":null}"#);
    }
}
