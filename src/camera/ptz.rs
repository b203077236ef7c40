use super::stream::{PipelineControls, StreamWorker};
use super::CameraBackend;
use crate::config::PtzConfig;
use crate::error::CameraError;
use async_trait::async_trait;
use std::fs::File;
use std::io::Read;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Bounded connect for the video stream; issued from the controller
/// path, so it must stay short.
const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
/// Read timeout inside the stream workers; expiry just recycles the pump.
const STREAM_READ_TIMEOUT: Duration = Duration::from_millis(500);
/// How long a control command waits for the camera's acknowledgement.
const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Axis values travel as i32 ten-thousandths.
const AXIS_SCALE: f64 = 10_000.0;

const FRAME_MAGIC: [u8; 2] = [0x50, 0x54];
const OP_ABSOLUTE_MOVE: u8 = 0x01;
const OP_ZOOM: u8 = 0x02;
const ACK: u8 = 0x06;
const NAK: u8 = 0x15;

/// Command channel to the camera's pan-tilt-zoom head.
///
/// The wire protocol is the vendor's business; callers only see an
/// opaque sink that can fail.
#[async_trait]
pub trait PtzControlPort: Send {
    /// Drive all three axes to an absolute setpoint.
    async fn absolute_move(&mut self, pan: f64, tilt: f64, zoom: f64) -> Result<(), CameraError>;

    /// Drive the zoom axis alone, leaving aim untouched.
    async fn zoom_to(&mut self, zoom: f64) -> Result<(), CameraError>;
}

/// Control port shared between the camera backend (zoom toggles) and
/// the motion dispatcher (absolute moves); the mutex serializes them.
pub type SharedControlPort = Arc<tokio::sync::Mutex<Box<dyn PtzControlPort>>>;

/// Binary command client for the camera's TCP control endpoint.
///
/// Frame: magic "PT", opcode, big-endian i32 payload in axis
/// ten-thousandths, XOR checksum; the camera answers one ACK/NAK byte.
pub struct TcpControlPort {
    stream: TcpStream,
    peer: String,
}

impl TcpControlPort {
    pub async fn connect(host: &str, port: u16) -> Result<Self, CameraError> {
        let peer = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&peer).await.map_err(|e| {
            CameraError::disconnected(format!("control endpoint {} unreachable: {}", peer, e))
        })?;
        stream
            .set_nodelay(true)
            .map_err(|e| CameraError::disconnected(format!("control socket setup: {}", e)))?;

        info!("PTZ control channel up at {}", peer);
        Ok(Self { stream, peer })
    }

    async fn send_command(&mut self, opcode: u8, axes: &[f64]) -> Result<(), CameraError> {
        let mut frame = Vec::with_capacity(4 + axes.len() * 4);
        frame.extend_from_slice(&FRAME_MAGIC);
        frame.push(opcode);
        let payload_start = frame.len();
        for axis in axes {
            frame.extend_from_slice(&scale_axis(*axis).to_be_bytes());
        }
        let checksum = frame[payload_start..].iter().fold(0u8, |acc, b| acc ^ b);
        frame.push(checksum);

        self.stream.write_all(&frame).await.map_err(|e| {
            CameraError::disconnected(format!("control write to {} failed: {}", self.peer, e))
        })?;

        let mut reply = [0u8; 1];
        let read = tokio::time::timeout(REPLY_TIMEOUT, self.stream.read_exact(&mut reply)).await;
        match read {
            Ok(Ok(_)) => match reply[0] {
                ACK => Ok(()),
                NAK => Err(CameraError::rejected("camera refused the command")),
                other => Err(CameraError::disconnected(format!(
                    "unexpected control reply 0x{:02x}",
                    other
                ))),
            },
            Ok(Err(e)) => Err(CameraError::disconnected(format!(
                "control read from {} failed: {}",
                self.peer, e
            ))),
            Err(_) => Err(CameraError::disconnected(format!(
                "control reply from {} timed out",
                self.peer
            ))),
        }
    }
}

fn scale_axis(value: f64) -> i32 {
    (value * AXIS_SCALE).round() as i32
}

#[async_trait]
impl PtzControlPort for TcpControlPort {
    async fn absolute_move(&mut self, pan: f64, tilt: f64, zoom: f64) -> Result<(), CameraError> {
        debug!(
            "PTZ absolute move pan {:.3} tilt {:.3} zoom {:.3}",
            pan, tilt, zoom
        );
        self.send_command(OP_ABSOLUTE_MOVE, &[pan, tilt, zoom]).await
    }

    async fn zoom_to(&mut self, zoom: f64) -> Result<(), CameraError> {
        debug!("PTZ zoom to {:.3}", zoom);
        self.send_command(OP_ZOOM, &[zoom]).await
    }
}

/// Encoded video stream pulled from the camera over TCP.
///
/// EOF from the camera is a hard fault, not idle, so a dead stream
/// stops the worker instead of idling forever.
pub struct NetworkStreamSource {
    stream: std::net::TcpStream,
}

impl NetworkStreamSource {
    pub fn connect(host: &str, port: u16) -> Result<Self, CameraError> {
        let addr = format!("{}:{}", host, port)
            .to_socket_addrs()
            .map_err(|e| CameraError::disconnected(format!("resolving {}: {}", host, e)))?
            .next()
            .ok_or_else(|| CameraError::disconnected(format!("no address for {}", host)))?;

        let stream =
            std::net::TcpStream::connect_timeout(&addr, STREAM_CONNECT_TIMEOUT).map_err(|e| {
                CameraError::disconnected(format!("video stream {} unreachable: {}", addr, e))
            })?;
        stream
            .set_read_timeout(Some(STREAM_READ_TIMEOUT))
            .map_err(|e| CameraError::disconnected(format!("stream socket setup: {}", e)))?;

        Ok(Self { stream })
    }
}

impl super::stream::FrameSource for NetworkStreamSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.stream.read(buf) {
            Ok(0) => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "camera closed the stream",
            )),
            other => other,
        }
    }
}

/// Remote pan-tilt-zoom network camera.
///
/// Preview and recording each run a dedicated stream worker over their
/// own connection; the control channel is persistent and shared with
/// the motion dispatcher. Timestamps are stamped server-side, so the
/// overlay call is a no-op here.
pub struct PtzCamera {
    host: String,
    stream_port: u16,
    control: SharedControlPort,
    zoom_min: f64,
    zoom_max: f64,
    controls: Arc<PipelineControls>,
    record: Option<StreamWorker>,
    preview: Option<StreamWorker>,
    zoomed: bool,
}

impl PtzCamera {
    /// Connect the control channel and aim the camera at its configured
    /// home position.
    pub async fn connect(ptz: &PtzConfig) -> Result<Self, CameraError> {
        let mut port = TcpControlPort::connect(&ptz.host, ptz.control_port).await?;
        port.absolute_move(ptz.home_pan, ptz.home_tilt, ptz.home_zoom)
            .await?;

        info!(
            "PTZ camera at {} ready (stream port {})",
            ptz.host, ptz.stream_port
        );

        Ok(Self {
            host: ptz.host.clone(),
            stream_port: ptz.stream_port,
            control: Arc::new(tokio::sync::Mutex::new(Box::new(port))),
            zoom_min: ptz.zoom_min,
            zoom_max: ptz.zoom_max,
            controls: PipelineControls::new(),
            record: None,
            preview: None,
            zoomed: false,
        })
    }
}

#[async_trait]
impl CameraBackend for PtzCamera {
    fn extension(&self) -> &'static str {
        "avi"
    }

    async fn start_recording(&mut self, path: &Path, quality: u32) -> Result<(), CameraError> {
        if self.record.is_some() {
            return Err(CameraError::rejected("recording already active"));
        }

        let source = NetworkStreamSource::connect(&self.host, self.stream_port)?;
        let sink = File::create(path).map_err(|e| CameraError::io(path, e))?;

        self.controls.set_quality(quality);
        let worker = StreamWorker::spawn(
            "ptz-record",
            Box::new(source),
            Box::new(sink),
            Arc::clone(&self.controls),
        )
        .map_err(|e| CameraError::io(path, e))?;

        self.record = Some(worker);
        info!("Started recording: {}", path.display());
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<(), CameraError> {
        if let Some(worker) = self.record.take() {
            let faulted = worker.faulted();
            worker.stop();
            if faulted {
                warn!("Recording stream had faulted before stop");
            }
            info!("Stopped recording");
        }
        Ok(())
    }

    async fn start_preview(&mut self) -> Result<(), CameraError> {
        if self.preview.is_some() {
            return Ok(());
        }

        let source = NetworkStreamSource::connect(&self.host, self.stream_port)?;
        let worker = StreamWorker::spawn(
            "ptz-preview",
            Box::new(source),
            Box::new(std::io::sink()),
            Arc::clone(&self.controls),
        )
        .map_err(|e| CameraError::disconnected(format!("preview worker: {}", e)))?;

        self.preview = Some(worker);
        info!("Started preview");
        Ok(())
    }

    async fn stop_preview(&mut self) -> Result<(), CameraError> {
        if let Some(worker) = self.preview.take() {
            worker.stop();
            info!("Stopped preview");
        }
        Ok(())
    }

    async fn toggle_zoom(&mut self) -> Result<(), CameraError> {
        let target = if self.zoomed {
            self.zoom_min
        } else {
            self.zoom_max
        };
        self.control.lock().await.zoom_to(target).await?;
        self.zoomed = !self.zoomed;
        debug!("Zoom {}", if self.zoomed { "on" } else { "off" });
        Ok(())
    }

    fn set_timestamp_overlay(&mut self, _text: &str) {
        // The camera burns its own timestamp into the stream.
    }

    async fn release(&mut self) -> Result<(), CameraError> {
        self.stop_recording().await?;
        self.stop_preview().await?;
        info!("Released PTZ camera at {}", self.host);
        Ok(())
    }

    fn shared_control(&self) -> Option<SharedControlPort> {
        Some(Arc::clone(&self.control))
    }
}
