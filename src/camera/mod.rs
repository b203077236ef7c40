mod mock;
mod onboard;
mod ptz;
mod stream;

pub use mock::{CameraCall, MockCamera, MockCameraHandle};
pub use onboard::{OnboardCameraV1, OnboardCameraV2};
pub use ptz::{NetworkStreamSource, PtzCamera, PtzControlPort, SharedControlPort, TcpControlPort};
pub use stream::{CropWindow, FrameSource, PipelineControls, StreamWorker};

use crate::config::{CameraKind, FieldcamConfig};
use crate::error::CameraError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Capability contract every camera backend satisfies.
///
/// The recording controller owns exactly one boxed backend and is the
/// only caller of the recording methods; nothing else may hold a live
/// reference while a recording is active.
#[async_trait]
pub trait CameraBackend: Send {
    /// File extension the backend's vendor pipeline produces, without
    /// the leading dot.
    fn extension(&self) -> &'static str;

    /// Open the destination and start the vendor pipeline writing to it.
    ///
    /// `Io` means the destination could not be opened, `Disconnected`
    /// means the device or stream is unreachable; the caller treats the
    /// two differently on its status surface.
    async fn start_recording(&mut self, path: &Path, quality: u32) -> Result<(), CameraError>;

    /// Stop the active recording and release the destination. Safe to
    /// call when nothing is recording.
    async fn stop_recording(&mut self) -> Result<(), CameraError>;

    /// Show the live feed on the local display surface.
    async fn start_preview(&mut self) -> Result<(), CameraError>;

    async fn stop_preview(&mut self) -> Result<(), CameraError>;

    /// Flip between the zoomed and unzoomed state. How far it zooms is
    /// backend-specific; the contract is only that it is binary.
    async fn toggle_zoom(&mut self) -> Result<(), CameraError>;

    /// Update the timestamp text burned onto the stream. Onboard
    /// pipelines apply it on the next frame; the PTZ camera stamps
    /// server-side and ignores it.
    fn set_timestamp_overlay(&mut self, text: &str);

    /// Stop everything and release the device for process exit.
    async fn release(&mut self) -> Result<(), CameraError>;

    /// Motion control channel, for backends with a steerable head.
    fn shared_control(&self) -> Option<SharedControlPort> {
        None
    }
}

/// Build the configured backend, retrying transient connection failures
/// with exponential backoff.
///
/// Field deployments regularly power the camera and the recorder from
/// the same bus; the camera routinely comes up later than we do.
pub async fn create_backend(config: &FieldcamConfig) -> Result<Box<dyn CameraBackend>, CameraError> {
    let attempts = match config.camera.kind {
        CameraKind::Ptz => config.ptz.connect_attempts,
        _ => 1,
    };

    let mut delay = Duration::from_secs(1);
    let mut last_error: Option<CameraError> = None;

    for attempt in 1..=attempts {
        match try_create_backend(config).await {
            Ok(backend) => {
                info!(
                    "Camera backend ready: {:?} (.{})",
                    config.camera.kind,
                    backend.extension()
                );
                return Ok(backend);
            }
            Err(e) => {
                warn!(
                    "Camera backend attempt {}/{} failed: {}",
                    attempt, attempts, e
                );
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| CameraError::disconnected("no connection attempts made")))
}

async fn try_create_backend(config: &FieldcamConfig) -> Result<Box<dyn CameraBackend>, CameraError> {
    match config.camera.kind {
        CameraKind::OnboardV1 => Ok(Box::new(OnboardCameraV1::new(&config.camera)?)),
        CameraKind::OnboardV2 => Ok(Box::new(OnboardCameraV2::new(&config.camera)?)),
        CameraKind::Ptz => {
            let camera = PtzCamera::connect(&config.ptz).await?;
            Ok(Box::new(camera))
        }
        CameraKind::Mock => Ok(Box::new(MockCamera::new())),
    }
}
