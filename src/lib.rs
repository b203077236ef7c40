pub mod config;
pub mod error;
pub mod storage;
pub mod camera;
pub mod recorder;
pub mod motion;
pub mod ui;
pub mod buttons;
pub mod keyboard;
pub mod netinfo;
pub mod telemetry;
pub mod app;

pub use app::{FieldcamApp, ShutdownReason};
pub use buttons::{ButtonDispatcher, ButtonPins, InertPins};
pub use camera::{create_backend, CameraBackend, PtzControlPort, SharedControlPort};
pub use config::FieldcamConfig;
pub use error::{CameraError, FieldcamError, RecorderError, Result};
pub use keyboard::{InputCommand, KeyboardInput};
pub use motion::{DispatchOutcome, MotionCommandDispatcher, MotionState};
pub use recorder::{RecorderPhase, RecorderState, RecorderStatus, RecordingController};
pub use storage::{FreeSpaceProbe, StorageSelector};
pub use telemetry::{ChargeMonitor, SolarLogger, SolarReading};
pub use ui::{UiPage, UiStateMachine};
