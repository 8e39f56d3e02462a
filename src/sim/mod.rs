//! Ball-and-beam playback core
//!
//! Everything in here is platform independent:
//! - No rendering backend, timers or network access
//! - Time and telemetry come in through traits
//! - Geometry is computed in millimeters and scaled to pixels at the edge

pub mod balance;
pub mod beam;
pub mod catalog;
pub mod frame;
pub mod physics;
pub mod playback;
pub mod replay;

pub use balance::{BalanceWindow, longest_run};
pub use beam::{BeamSegment, viewport_center};
pub use catalog::{GAIN_KEY_PREFIX, LoadReport, SimulationCatalog, SimulationDataset};
pub use frame::{Frame, Gains};
pub use physics::{BallDisc, BeamStroke, CanvasSize, PhysicsRenderer, RenderState, Scene};
pub use playback::{Intent, PlaybackController, PlaybackMode, Surface, TickOutcome, TickToken};
pub use replay::{FinishedReplay, ReplayRecorder, ReplaySession};
