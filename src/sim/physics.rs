//! Frame-to-scene transform
//!
//! Converts raw motor/sensor readings into beam and ball geometry. Ball
//! position is tracked across frames: while the sensor sees the ball it sits
//! on the beam surface, and when the sensor loses it the last motion is
//! extrapolated as a fall off the beam.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::balance::BalanceWindow;
use super::beam::BeamSegment;
use super::frame::Frame;
use crate::consts::*;
use crate::sensor_to_mm;

/// Drawing surface size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixels per millimeter; follows the current canvas width
    #[inline]
    pub fn scale(&self) -> f32 {
        self.width as f32 / VIEWPORT_WIDTH
    }

    #[inline]
    pub fn to_pixels(&self, mm: Vec2) -> Vec2 {
        mm * self.scale()
    }
}

impl Default for CanvasSize {
    fn default() -> Self {
        // 2 px per mm
        Self::new(VIEWPORT_WIDTH as u32 * 2, VIEWPORT_HEIGHT as u32 * 2)
    }
}

/// Mutable per-session render state (physical units)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderState {
    /// Last known ball center; `None` until the ball is first seen
    pub position: Option<Vec2>,
    /// Ball displacement per frame
    pub velocity: Vec2,
    /// Consecutive in-band frames
    pub balance: BalanceWindow,
    /// Celebration already fired this session
    pub celebrated: bool,
}

/// Beam stroke in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamStroke {
    pub start: Vec2,
    pub end: Vec2,
    pub width: f32,
}

/// Ball disc in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallDisc {
    pub center: Vec2,
    pub radius: f32,
    /// Ball has been in the balance band past the window threshold
    pub balanced: bool,
}

/// Everything needed to draw one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub canvas: CanvasSize,
    pub beam: BeamStroke,
    /// Absent when the ball has never been seen this session
    pub ball: Option<BallDisc>,
    /// The one-shot balance celebration fired on this frame
    pub celebrate: bool,
}

/// Stateful per-frame transform from raw readings to a [`Scene`]
#[derive(Debug, Clone)]
pub struct PhysicsRenderer {
    balance_frames: u32,
    state: RenderState,
}

impl Default for PhysicsRenderer {
    fn default() -> Self {
        Self::new(crate::balance_frames(BALANCE_SECONDS, FRAME_RATE))
    }
}

impl PhysicsRenderer {
    /// A zero window is raised to one frame
    pub fn new(balance_frames: u32) -> Self {
        Self {
            balance_frames: balance_frames.max(1),
            state: RenderState::default(),
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RenderState {
        &mut self.state
    }

    pub fn balance_frames(&self) -> u32 {
        self.balance_frames
    }

    /// Forget the ball and re-arm the celebration (playback start/restart)
    pub fn reset(&mut self) {
        self.state = RenderState::default();
    }

    /// Whether the current run has passed the balance threshold
    pub fn is_balanced(&self) -> bool {
        self.state.balance.run() > self.balance_frames
    }

    /// Advance one frame and compute what to draw
    pub fn redraw(&mut self, frame: &Frame, canvas: CanvasSize) -> Scene {
        let m = -frame.m;
        let beam = BeamSegment::from_motor(m);

        let run = self.state.balance.observe(frame.s);
        let mut celebrate = false;
        if run > self.balance_frames && !self.state.celebrated {
            self.state.celebrated = true;
            celebrate = true;
            log::info!("Ball balanced for {} frames", run);
        }

        match frame.s {
            Some(raw) => self.track(&beam, sensor_to_mm(raw)),
            None => self.freefall(),
        }

        let balanced = self.is_balanced();
        let ball = self.state.position.map(|pos| BallDisc {
            center: canvas.to_pixels(pos),
            radius: BALL_DIAMETER / 2.0 * canvas.scale(),
            balanced,
        });

        Scene {
            canvas,
            beam: BeamStroke {
                start: canvas.to_pixels(beam.start),
                end: canvas.to_pixels(beam.end),
                width: BEAM_HEIGHT * canvas.scale(),
            },
            ball,
            celebrate,
        }
    }

    /// Place the ball on the beam surface `s_mm` from the pivot end
    fn track(&mut self, beam: &BeamSegment, s_mm: f32) {
        let pos = beam.point_from_pivot(s_mm, BALL_DIAMETER / 2.0);
        self.state.velocity = match self.state.position {
            Some(prev) => pos - prev,
            None => Vec2::ZERO,
        };
        self.state.position = Some(pos);
    }

    /// Carry the ball along its last motion and let it drop
    fn freefall(&mut self) {
        let Some(pos) = self.state.position.as_mut() else {
            return;
        };
        pos.x += self.state.velocity.x;
        pos.y += FREEFALL_GRAVITY;
        pos.y *= FREEFALL_EXPANSION;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANVAS: CanvasSize = CanvasSize::new(900, 700);

    #[test]
    fn test_scale_follows_canvas_width() {
        let mut renderer = PhysicsRenderer::default();
        let frame = Frame::detected(0.0, 800.0);

        let small = renderer.redraw(&frame, CanvasSize::new(450, 350));
        let large = renderer.redraw(&frame, CanvasSize::new(900, 700));
        assert_eq!(small.beam.start * 2.0, large.beam.start);
        assert_eq!(small.beam.width * 2.0, large.beam.width);
        assert_eq!(
            small.ball.unwrap().center * 2.0,
            large.ball.unwrap().center
        );
    }

    #[test]
    fn test_motor_is_sign_flipped() {
        let mut renderer = PhysicsRenderer::default();
        let scene = renderer.redraw(&Frame::detected(10.0, 800.0), CanvasSize::new(450, 350));
        // Positive raw motor lowers the left end (y down on screen)
        assert_eq!(scene.beam.start.y, 185.0);
        assert_eq!(scene.beam.end.y, 175.0);
    }

    #[test]
    fn test_ball_rests_on_level_beam() {
        let mut renderer = PhysicsRenderer::default();
        let scene = renderer.redraw(&Frame::detected(0.0, 900.0), CanvasSize::new(450, 350));
        let ball = scene.ball.unwrap();
        // (900 - 300) * 420 / 1200 = 210 mm from the right end
        assert!((ball.center.x - 225.0).abs() < 1e-3);
        assert!((ball.center.y - 165.0).abs() < 1e-3);
        assert_eq!(ball.radius, 10.0);
    }

    #[test]
    fn test_velocity_is_frame_delta() {
        let mut renderer = PhysicsRenderer::default();
        renderer.redraw(&Frame::detected(0.0, 900.0), CANVAS);
        assert_eq!(renderer.state().velocity, Vec2::ZERO);

        let before = renderer.state().position.unwrap();
        renderer.redraw(&Frame::detected(0.0, 1020.0), CANVAS);
        let after = renderer.state().position.unwrap();
        assert_eq!(renderer.state().velocity, after - before);
        assert!((renderer.state().velocity.x + 42.0).abs() < 1e-3);
    }

    #[test]
    fn test_freefall_from_rest() {
        let mut renderer = PhysicsRenderer::default();
        let start = Vec2::new(100.0, 150.0);
        renderer.state_mut().position = Some(start);
        renderer.state_mut().velocity = Vec2::ZERO;

        renderer.redraw(&Frame::lost(0.0), CANVAS);

        let pos = renderer.state().position.unwrap();
        assert_eq!(pos.x, start.x);
        assert_eq!(pos.y, (start.y + FREEFALL_GRAVITY) * FREEFALL_EXPANSION);
    }

    #[test]
    fn test_freefall_keeps_horizontal_velocity() {
        let mut renderer = PhysicsRenderer::default();
        renderer.state_mut().position = Some(Vec2::new(100.0, 150.0));
        renderer.state_mut().velocity = Vec2::new(-3.0, 0.5);

        renderer.redraw(&Frame::lost(0.0), CANVAS);
        renderer.redraw(&Frame::lost(0.0), CANVAS);

        assert_eq!(renderer.state().position.unwrap().x, 94.0);
        assert_eq!(renderer.state().velocity, Vec2::new(-3.0, 0.5));
    }

    #[test]
    fn test_freefall_before_first_sighting_draws_no_ball() {
        let mut renderer = PhysicsRenderer::default();
        let scene = renderer.redraw(&Frame::lost(0.0), CANVAS);
        assert!(scene.ball.is_none());
    }

    #[test]
    fn test_zero_reading_is_a_detection() {
        let mut renderer = PhysicsRenderer::default();
        renderer.redraw(&Frame::detected(0.0, 0.0), CANVAS);
        assert!(renderer.state().position.is_some());
    }

    #[test]
    fn test_celebration_fires_once_past_threshold() {
        let mut renderer = PhysicsRenderer::new(180);
        let frame = Frame::detected(0.0, 800.0);

        let fired: Vec<bool> = (0..400)
            .map(|_| renderer.redraw(&frame, CANVAS).celebrate)
            .collect();
        assert_eq!(fired.iter().filter(|f| **f).count(), 1);
        // Counter exceeds 180 on the 181st frame
        assert!(fired[180]);
        assert!(!fired[179]);

        // Leaving and re-entering the band does not re-fire
        renderer.redraw(&Frame::lost(0.0), CANVAS);
        let again = (0..200).any(|_| renderer.redraw(&frame, CANVAS).celebrate);
        assert!(!again);
    }

    #[test]
    fn test_reset_rearms_celebration() {
        let mut renderer = PhysicsRenderer::new(2);
        let frame = Frame::detected(0.0, 800.0);
        for _ in 0..3 {
            renderer.redraw(&frame, CANVAS);
        }
        assert!(renderer.state().celebrated);

        renderer.reset();
        assert_eq!(renderer.state(), &RenderState::default());
        let fired = (0..3).map(|_| renderer.redraw(&frame, CANVAS).celebrate).last();
        assert_eq!(fired, Some(true));
    }

    #[test]
    fn test_ball_colour_state_tracks_threshold() {
        let mut renderer = PhysicsRenderer::new(2);
        let frame = Frame::detected(0.0, 800.0);
        let flags: Vec<bool> = (0..4)
            .map(|_| renderer.redraw(&frame, CANVAS).ball.unwrap().balanced)
            .collect();
        assert_eq!(flags, vec![false, false, true, true]);

        let out = renderer.redraw(&Frame::detected(0.0, 1400.0), CANVAS);
        assert!(!out.ball.unwrap().balanced);
    }

    #[test]
    fn test_zero_window_does_not_celebrate_first_frame() {
        let mut renderer = PhysicsRenderer::new(0);
        let frame = Frame::detected(0.0, 800.0);
        assert!(!renderer.redraw(&frame, CANVAS).celebrate);
        assert!(renderer.redraw(&frame, CANVAS).celebrate);
    }
}
