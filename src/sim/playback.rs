//! Playback state machine
//!
//! One controller owns the session: idle, recording a live feed, or playing
//! back a precomputed dataset. Simulated playback is driven by the host,
//! which calls [`PlaybackController::tick`] roughly every 16.67 ms with the
//! token it was handed. Every transition out of a simulation bumps the token
//! generation, so a tick scheduled for a superseded session is inert when it
//! wakes.

use serde::{Deserialize, Serialize};

use super::catalog::SimulationCatalog;
use super::frame::{Frame, Gains};
use super::physics::{CanvasSize, PhysicsRenderer, Scene};
use super::replay::{ReplayRecorder, ReplaySession};
use crate::error::PlaybackError;
use crate::platform::Clock;
use crate::settings::{Settings, SettingsProvider, UnitSettings};
use crate::telemetry::{Button, Envelope, ReplayTransport, TelemetryMessage};

/// Which kind of session is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackMode {
    Idle,
    RecordingLive,
    Simulating,
}

/// Which display a start/stop button belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Live,
    Simulation,
}

/// A user request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    Start(Gains),
    Stop,
    Simulate(Gains),
}

impl Intent {
    /// Map a start/stop button press (`r` = 1 start, 0 stop) to an intent
    pub fn from_button(surface: Surface, gains: Gains, r: u8) -> Option<Self> {
        match (r, surface) {
            (1, Surface::Live) => Some(Intent::Start(gains)),
            (1, Surface::Simulation) => Some(Intent::Simulate(gains)),
            (0, _) => Some(Intent::Stop),
            _ => None,
        }
    }
}

/// Handle for one scheduled simulation tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickToken {
    generation: u64,
}

/// Result of running a tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A frame was drawn; schedule `next` after one frame interval
    Rendered { scene: Scene, next: TickToken },
    /// The dataset ran out and playback returned to idle
    Finished,
    /// The token belongs to a session that already ended
    Stale,
}

#[derive(Debug)]
enum Session {
    Idle,
    Recording(ReplaySession),
    Simulating { dataset: usize, cursor: usize },
}

/// Owns the session state and routes frames to the renderer and recorder
pub struct PlaybackController {
    session: Session,
    /// Bumped whenever a pending simulation tick must be invalidated
    generation: u64,
    /// `None` until the archive has finished loading
    catalog: Option<SimulationCatalog>,
    renderer: PhysicsRenderer,
    recorder: ReplayRecorder,
    canvas: CanvasSize,
    transport: Box<dyn ReplayTransport>,
    provider: Box<dyn SettingsProvider>,
    clock: Box<dyn Clock>,
}

impl PlaybackController {
    pub fn new(
        settings: &Settings,
        transport: Box<dyn ReplayTransport>,
        provider: Box<dyn SettingsProvider>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let balance_frames = settings.balance_frames();
        Self {
            session: Session::Idle,
            generation: 0,
            catalog: None,
            renderer: PhysicsRenderer::new(balance_frames),
            recorder: ReplayRecorder::new(balance_frames),
            canvas: CanvasSize::default(),
            transport,
            provider,
            clock,
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        match self.session {
            Session::Idle => PlaybackMode::Idle,
            Session::Recording(_) => PlaybackMode::RecordingLive,
            Session::Simulating { .. } => PlaybackMode::Simulating,
        }
    }

    /// The open live recording, if any
    pub fn session(&self) -> Option<&ReplaySession> {
        match &self.session {
            Session::Recording(session) => Some(session),
            _ => None,
        }
    }

    /// Index of the next simulated frame, if simulating
    pub fn cursor(&self) -> Option<usize> {
        match self.session {
            Session::Simulating { cursor, .. } => Some(cursor),
            _ => None,
        }
    }

    pub fn renderer(&self) -> &PhysicsRenderer {
        &self.renderer
    }

    pub fn catalog(&self) -> Option<&SimulationCatalog> {
        self.catalog.as_ref()
    }

    /// Make the loaded archive available to `simulate`
    pub fn install_catalog(&mut self, catalog: SimulationCatalog) {
        log::info!("Simulation data ready ({} datasets)", catalog.len());
        self.catalog = Some(catalog);
    }

    pub fn set_canvas(&mut self, canvas: CanvasSize) {
        self.canvas = canvas;
    }

    /// Apply a user request; returns a token when a simulation starts
    pub fn handle(&mut self, intent: Intent) -> Result<Option<TickToken>, PlaybackError> {
        match intent {
            Intent::Start(gains) => {
                self.start(gains);
                Ok(None)
            }
            Intent::Stop => {
                self.stop();
                Ok(None)
            }
            Intent::Simulate(gains) => self.simulate(gains).map(Some),
        }
    }

    /// Open a new live recording, cancelling any running simulation
    pub fn start(&mut self, gains: Gains) {
        match self.session {
            Session::Simulating { .. } => {
                self.cancel_pending();
                log::info!("Simulation cancelled for live recording");
            }
            Session::Recording(_) => {
                log::warn!("Recording restarted, discarding the open session");
            }
            Session::Idle => {}
        }

        let unit = self.provider.unit_settings();
        let session = ReplaySession::new(gains, unit.clone(), self.clock.now());
        self.renderer.reset();
        self.session = Session::Recording(session);
        log::info!("Recording started (p={}, i={}, d={})", gains.p, gains.i, gains.d);

        self.send(TelemetryMessage::click(Button::Start, gains), &unit);
    }

    /// End the current session; a live recording is finalized and uploaded
    pub fn stop(&mut self) {
        match std::mem::replace(&mut self.session, Session::Idle) {
            Session::Recording(session) => {
                log::info!("Recording stopped. Uploading data...");
                let unit = session.unit.clone();
                self.send(TelemetryMessage::click(Button::Stop, session.gains), &unit);
                let replay = self.recorder.finalize(session);
                self.send(TelemetryMessage::Replay { replay }, &unit);
            }
            Session::Simulating { cursor, .. } => {
                self.cancel_pending();
                log::info!("Simulation stopped at frame {}", cursor);
            }
            Session::Idle => {}
        }
    }

    /// Play back the dataset nearest to `gains.p`
    ///
    /// Fails without changing state when no data is loaded.
    pub fn simulate(&mut self, gains: Gains) -> Result<TickToken, PlaybackError> {
        if matches!(self.session, Session::Recording(_)) {
            return Err(PlaybackError::RecordingInProgress);
        }
        let catalog = self.catalog.as_ref().ok_or(PlaybackError::CatalogEmpty)?;
        let dataset = catalog.nearest_index(gains.p)?;
        if let Some(data) = catalog.get(dataset) {
            log::info!(
                "Simulating kp={} ({} frames) for requested p={}",
                data.gain_key,
                data.len(),
                gains.p
            );
        }

        self.cancel_pending();
        self.renderer.reset();
        self.session = Session::Simulating { dataset, cursor: 0 };
        Ok(self.current_token())
    }

    /// Handle a live reading from the rig
    ///
    /// Recorded while a live session is open, drawn but not recorded while
    /// idle, ignored during a simulation.
    pub fn ingest(&mut self, frame: Frame) -> Option<Scene> {
        match &mut self.session {
            Session::Recording(session) => {
                self.recorder.append_frame(session, frame);
            }
            Session::Idle => {}
            Session::Simulating { .. } => {
                log::debug!("Ignoring live frame during simulation");
                return None;
            }
        }
        Some(self.renderer.redraw(&frame, self.canvas))
    }

    /// Run one scheduled simulation tick
    pub fn tick(&mut self, token: TickToken) -> TickOutcome {
        if let Err(e) = self.check_token(token) {
            log::debug!("Discarding tick: {}", e);
            return TickOutcome::Stale;
        }
        let Session::Simulating { dataset, cursor } = &mut self.session else {
            return TickOutcome::Stale;
        };

        let frame = self
            .catalog
            .as_ref()
            .and_then(|catalog| catalog.get(*dataset))
            .and_then(|data| data.frames.get(*cursor))
            .copied();

        match frame {
            Some(frame) => {
                *cursor += 1;
                let scene = self.renderer.redraw(&frame, self.canvas);
                TickOutcome::Rendered { scene, next: token }
            }
            None => {
                log::info!("Simulation finished");
                self.session = Session::Idle;
                self.cancel_pending();
                TickOutcome::Finished
            }
        }
    }

    fn check_token(&self, token: TickToken) -> Result<(), PlaybackError> {
        let live = token.generation == self.generation
            && matches!(self.session, Session::Simulating { .. });
        if live {
            Ok(())
        } else {
            Err(PlaybackError::StaleTick)
        }
    }

    fn current_token(&self) -> TickToken {
        TickToken {
            generation: self.generation,
        }
    }

    /// Invalidate every outstanding tick token
    fn cancel_pending(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn send(&mut self, message: TelemetryMessage, unit: &UnitSettings) {
        let envelope = Envelope::new(message, unit, &self.clock.now());
        self.transport.send(envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::FixedClock;
    use crate::settings::{Group, StoredSettings};
    use chrono::DateTime;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct MemoryTransport(Rc<RefCell<Vec<Envelope>>>);

    impl ReplayTransport for MemoryTransport {
        fn send(&mut self, envelope: Envelope) {
            self.0.borrow_mut().push(envelope);
        }
    }

    fn controller() -> (PlaybackController, MemoryTransport) {
        let transport = MemoryTransport::default();
        let settings = Settings {
            unit: Some(UnitSettings {
                unit_number: 9,
                group: Some(Group::Experiment),
            }),
            ..Default::default()
        };
        let at = DateTime::parse_from_rfc3339("2023-11-29T14:01:47.734-05:00").unwrap();
        let controller = PlaybackController::new(
            &settings,
            Box::new(transport.clone()),
            Box::new(StoredSettings::new(&settings)),
            Box::new(FixedClock(at)),
        );
        (controller, transport)
    }

    fn catalog() -> SimulationCatalog {
        let frames = |s: f32, n: usize| json!(vec![json!({ "m": 0, "s": s }); n]);
        let (catalog, _) = SimulationCatalog::load(vec![
            ("kp0.00".to_string(), frames(400.0, 3)),
            ("kp0.03".to_string(), frames(700.0, 5)),
            ("kp0.10".to_string(), frames(900.0, 4)),
        ]);
        catalog
    }

    fn gains(p: f64) -> Gains {
        Gains::new(p, 0.0, 1.0)
    }

    #[test]
    fn test_start_and_stop_uploads_replay() {
        let (mut ctl, sent) = controller();
        assert_eq!(ctl.mode(), PlaybackMode::Idle);

        ctl.start(gains(0.05));
        assert_eq!(ctl.mode(), PlaybackMode::RecordingLive);
        assert!(ctl.session().is_some());

        let frames = [Frame::detected(1.0, 700.0), Frame::lost(2.0), Frame::detected(3.0, 800.0)];
        for frame in frames {
            assert!(ctl.ingest(frame).is_some());
        }
        assert_eq!(ctl.session().unwrap().len(), 3);

        ctl.stop();
        assert_eq!(ctl.mode(), PlaybackMode::Idle);
        assert!(ctl.session().is_none());

        let sent = sent.0.borrow();
        assert_eq!(sent.len(), 3);
        assert!(matches!(
            sent[0].message,
            TelemetryMessage::Click { button: Button::Start, .. }
        ));
        assert!(matches!(
            sent[1].message,
            TelemetryMessage::Click { button: Button::Stop, .. }
        ));
        let TelemetryMessage::Replay { replay } = &sent[2].message else {
            panic!("expected a replay upload");
        };
        assert_eq!(replay.frames, frames.to_vec());
        assert_eq!(replay.unit_number, 9);
        assert!(!replay.balanced);
        assert_eq!(sent[2].unit_number, 9);
    }

    #[test]
    fn test_idle_frames_are_drawn_not_recorded() {
        let (mut ctl, sent) = controller();
        assert!(ctl.ingest(Frame::detected(0.0, 700.0)).is_some());
        ctl.stop();
        assert!(sent.0.borrow().is_empty());
    }

    #[test]
    fn test_simulate_without_catalog_changes_nothing() {
        let (mut ctl, _) = controller();
        assert!(matches!(
            ctl.simulate(gains(0.03)),
            Err(PlaybackError::CatalogEmpty)
        ));
        assert_eq!(ctl.mode(), PlaybackMode::Idle);

        ctl.install_catalog(SimulationCatalog::new());
        assert!(matches!(
            ctl.handle(Intent::Simulate(gains(0.03))),
            Err(PlaybackError::CatalogEmpty)
        ));
        assert_eq!(ctl.mode(), PlaybackMode::Idle);
    }

    #[test]
    fn test_simulation_plays_nearest_dataset_to_the_end() {
        let (mut ctl, sent) = controller();
        ctl.install_catalog(catalog());

        let mut token = ctl.simulate(gains(0.07)).unwrap();
        assert_eq!(ctl.mode(), PlaybackMode::Simulating);
        assert_eq!(ctl.cursor(), Some(0));

        let mut rendered = 0;
        loop {
            match ctl.tick(token) {
                TickOutcome::Rendered { scene, next } => {
                    rendered += 1;
                    assert!(scene.ball.is_some());
                    token = next;
                }
                TickOutcome::Finished => break,
                TickOutcome::Stale => panic!("live token went stale"),
            }
        }
        // kp0.10 holds 4 frames
        assert_eq!(rendered, 4);
        assert_eq!(ctl.mode(), PlaybackMode::Idle);
        assert_eq!(ctl.tick(token), TickOutcome::Stale);
        assert!(sent.0.borrow().is_empty());
    }

    #[test]
    fn test_stop_makes_pending_tick_inert() {
        let (mut ctl, _) = controller();
        ctl.install_catalog(catalog());
        let token = ctl.simulate(gains(0.03)).unwrap();
        let TickOutcome::Rendered { next, .. } = ctl.tick(token) else {
            panic!("expected a frame");
        };
        assert_eq!(ctl.cursor(), Some(1));

        ctl.stop();
        assert_eq!(ctl.mode(), PlaybackMode::Idle);
        assert_eq!(ctl.cursor(), None);
        assert_eq!(ctl.tick(next), TickOutcome::Stale);
    }

    #[test]
    fn test_restarted_simulation_ignores_old_token() {
        let (mut ctl, _) = controller();
        ctl.install_catalog(catalog());
        let old = ctl.simulate(gains(0.0)).unwrap();
        let new = ctl.simulate(gains(0.1)).unwrap();

        assert_eq!(ctl.tick(old), TickOutcome::Stale);
        assert_eq!(ctl.cursor(), Some(0));
        assert!(matches!(ctl.tick(new), TickOutcome::Rendered { .. }));
    }

    #[test]
    fn test_start_during_simulation_cancels_playback() {
        let (mut ctl, _) = controller();
        ctl.install_catalog(catalog());
        let token = ctl.simulate(gains(0.03)).unwrap();
        let TickOutcome::Rendered { next, .. } = ctl.tick(token) else {
            panic!("expected a frame");
        };

        ctl.start(gains(0.03));
        assert_eq!(ctl.mode(), PlaybackMode::RecordingLive);
        assert_eq!(ctl.tick(next), TickOutcome::Stale);
        // The simulation's frames never reach the new recording
        assert!(ctl.session().unwrap().is_empty());
        assert!(!ctl.renderer().state().celebrated);
        assert!(ctl.renderer().state().position.is_none());
    }

    #[test]
    fn test_live_frames_ignored_while_simulating() {
        let (mut ctl, _) = controller();
        ctl.install_catalog(catalog());
        ctl.simulate(gains(0.03)).unwrap();
        assert!(ctl.ingest(Frame::detected(0.0, 700.0)).is_none());
    }

    #[test]
    fn test_simulate_refused_while_recording() {
        let (mut ctl, _) = controller();
        ctl.install_catalog(catalog());
        ctl.start(gains(0.03));
        assert!(matches!(
            ctl.simulate(gains(0.03)),
            Err(PlaybackError::RecordingInProgress)
        ));
        assert_eq!(ctl.mode(), PlaybackMode::RecordingLive);
    }

    #[test]
    fn test_restart_recording_discards_open_session() {
        let (mut ctl, sent) = controller();
        ctl.start(gains(0.01));
        ctl.ingest(Frame::detected(0.0, 700.0));
        ctl.start(gains(0.02));
        assert!(ctl.session().unwrap().is_empty());
        assert_eq!(ctl.session().unwrap().gains, gains(0.02));
        // Two start clicks, no replay
        assert_eq!(sent.0.borrow().len(), 2);
    }

    #[test]
    fn test_canvas_resize_applies_to_next_frame() {
        let (mut ctl, _) = controller();
        ctl.start(gains(0.03));
        let frame = Frame::detected(0.0, 800.0);

        ctl.set_canvas(CanvasSize::new(450, 350));
        let small = ctl.ingest(frame).unwrap();
        ctl.set_canvas(CanvasSize::new(1350, 1050));
        let large = ctl.ingest(frame).unwrap();

        assert_eq!(large.canvas, CanvasSize::new(1350, 1050));
        assert_eq!(small.beam.end * 3.0, large.beam.end);
        assert_eq!(small.ball.unwrap().radius * 3.0, large.ball.unwrap().radius);
    }

    #[test]
    fn test_intent_from_button() {
        let g = gains(0.05);
        assert_eq!(Intent::from_button(Surface::Live, g, 1), Some(Intent::Start(g)));
        assert_eq!(
            Intent::from_button(Surface::Simulation, g, 1),
            Some(Intent::Simulate(g))
        );
        assert_eq!(Intent::from_button(Surface::Live, g, 0), Some(Intent::Stop));
        assert_eq!(Intent::from_button(Surface::Live, g, 7), None);
    }

    #[test]
    fn test_balanced_recording_celebrates_and_is_flagged() {
        let (mut ctl, sent) = controller();
        ctl.start(gains(0.03));
        let celebrations = (0..200)
            .filter_map(|_| ctl.ingest(Frame::detected(0.0, 850.0)))
            .filter(|scene| scene.celebrate)
            .count();
        assert_eq!(celebrations, 1);

        ctl.stop();
        let sent = sent.0.borrow();
        let TelemetryMessage::Replay { replay } = &sent[2].message else {
            panic!("expected a replay upload");
        };
        assert!(replay.balanced);
        assert_eq!(replay.frames.len(), 200);
    }
}
