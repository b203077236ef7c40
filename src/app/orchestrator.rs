use super::types::ShutdownReason;
use crate::buttons::{ButtonDispatcher, ButtonPins, InertPins};
use crate::camera::{create_backend, CameraBackend};
use crate::config::FieldcamConfig;
use crate::error::Result;
use crate::keyboard::{InputCommand, KeyboardInput};
use crate::motion::MotionCommandDispatcher;
use crate::recorder::{RecorderStatus, RecordingController};
use crate::storage::StorageSelector;
use crate::telemetry::{ChargeMonitor, NoChargeController, SolarLogger};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(super) type ShutdownSlot = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

/// Main application coordinator wiring the recorder to its inputs.
///
/// The recording controller sits behind one async mutex; the tick loop
/// and the input handlers take turns on it. Everything else talks to
/// the system through the status watch channel.
pub struct FieldcamApp {
    pub(super) config: FieldcamConfig,
    pub(super) controller: Arc<Mutex<RecordingController>>,
    pub(super) buttons: Arc<Mutex<ButtonDispatcher>>,
    pub(super) motion: Option<Arc<Mutex<MotionCommandDispatcher>>>,

    // Status feed; the sender moves into the tick loop on start
    pub(super) status_tx: Option<watch::Sender<RecorderStatus>>,
    pub(super) status_rx: watch::Receiver<RecorderStatus>,

    // Optional services
    pub(super) keyboard: Option<KeyboardInput>,
    pub(super) command_rx: Option<mpsc::UnboundedReceiver<InputCommand>>,
    pub(super) telemetry: Option<SolarLogger>,
    pub(super) solar_csv: PathBuf,

    // Lifecycle management
    pub(super) tasks: Vec<JoinHandle<()>>,
    pub(super) shutdown_sender: ShutdownSlot,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl FieldcamApp {
    /// Create the application with the stock inert button harness.
    pub async fn new(config: FieldcamConfig) -> Result<Self> {
        Self::with_pins(config, Box::new(InertPins)).await
    }

    /// Create the application around a deployment's physical buttons.
    pub async fn with_pins(config: FieldcamConfig, pins: Box<dyn ButtonPins>) -> Result<Self> {
        let camera = create_backend(&config).await?;
        Ok(Self::assemble(config, camera, pins))
    }

    pub(super) fn assemble(
        config: FieldcamConfig,
        camera: Box<dyn CameraBackend>,
        pins: Box<dyn ButtonPins>,
    ) -> Self {
        let control_port = camera.shared_control();
        let storage = StorageSelector::from_config(&config.storage);
        let solar_csv = resolve_csv_path(&config.telemetry.csv_path, storage.home_dir());

        let now = Instant::now();
        let controller = RecordingController::new(camera, storage, &config, now);
        let (status_tx, status_rx) = watch::channel(controller.status(now));

        let motion = control_port.map(|port| {
            Arc::new(Mutex::new(MotionCommandDispatcher::new(
                port,
                &config.motion,
                &config.ptz,
            )))
        });

        let (keyboard, command_rx) = if config.system.keyboard_input {
            let (command_tx, command_rx) = mpsc::unbounded_channel();
            let keyboard = KeyboardInput::new(command_tx, config.motion.clone());
            (Some(keyboard), Some(command_rx))
        } else {
            (None, None)
        };

        let telemetry = if config.telemetry.enabled {
            Some(SolarLogger::new(
                solar_csv.clone(),
                Box::new(NoChargeController),
            ))
        } else {
            None
        };

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            config,
            controller: Arc::new(Mutex::new(controller)),
            buttons: Arc::new(Mutex::new(ButtonDispatcher::new(pins))),
            motion,
            status_tx: Some(status_tx),
            status_rx,
            keyboard,
            command_rx,
            telemetry,
            solar_csv,
            tasks: Vec::new(),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Swap in a hardware charge monitor before `start`. Until one is
    /// provided the telemetry log records port-fault rows.
    pub fn set_charge_monitor(&mut self, monitor: Box<dyn ChargeMonitor>) {
        if self.telemetry.is_some() {
            self.telemetry = Some(SolarLogger::new(self.solar_csv.clone(), monitor));
        }
    }

    /// Fresh subscription to the recorder status feed. Display front
    /// ends read this instead of touching the controller.
    pub fn status_receiver(&self) -> watch::Receiver<RecorderStatus> {
        self.status_rx.clone()
    }
}

/// Relative telemetry paths land next to the fallback recordings.
pub(super) fn resolve_csv_path(configured: &str, home_dir: &Path) -> PathBuf {
    let path = PathBuf::from(configured);
    if path.is_absolute() {
        path
    } else {
        home_dir.join(path)
    }
}
