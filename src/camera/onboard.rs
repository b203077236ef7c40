use super::stream::{CropWindow, PipelineControls, StreamWorker};
use super::CameraBackend;
use crate::config::CameraConfig;
use crate::error::CameraError;
use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Animated zoom walk length for the current-generation stack.
const ZOOM_STEPS: usize = 25;
const ZOOM_IN_FACTOR: f64 = 0.95;
const ZOOM_OUT_FACTOR: f64 = 1.05;

/// Onboard sensor camera through the legacy vendor capture stack.
///
/// The legacy stack exposes the annotation text and the crop window as
/// pipeline properties: zoom is a single switch to a centered window
/// sized by the display-to-sensor resolution ratio, and the timestamp
/// property must be rewritten at least once per second by the caller.
pub struct OnboardCameraV1 {
    config: CameraConfig,
    device_path: PathBuf,
    controls: Arc<PipelineControls>,
    recorder: Option<StreamWorker>,
    previewing: bool,
    zoomed: bool,
}

impl OnboardCameraV1 {
    pub fn new(config: &CameraConfig) -> Result<Self, CameraError> {
        let device_path = PathBuf::from(&config.device_path);
        probe_device(&device_path)?;

        info!(
            "Onboard camera (legacy stack) on {} at {}x{} rot {} @ {} fps",
            device_path.display(),
            config.resolution.0,
            config.resolution.1,
            config.rotation,
            config.framerate
        );

        Ok(Self {
            config: config.clone(),
            device_path,
            controls: PipelineControls::new(),
            recorder: None,
            previewing: false,
            zoomed: false,
        })
    }

    /// Crop window for the zoomed state: the portion of the sensor that
    /// maps 1:1 onto the preview screen.
    fn zoom_window(&self) -> CropWindow {
        let width = self.config.display_resolution.0 as f64 / self.config.resolution.0 as f64;
        let height = self.config.display_resolution.1 as f64 / self.config.resolution.1 as f64;
        CropWindow::centered(width, height)
    }

    #[cfg(test)]
    pub(crate) fn controls(&self) -> Arc<PipelineControls> {
        Arc::clone(&self.controls)
    }
}

#[async_trait]
impl CameraBackend for OnboardCameraV1 {
    fn extension(&self) -> &'static str {
        "h264"
    }

    async fn start_recording(&mut self, path: &Path, quality: u32) -> Result<(), CameraError> {
        if self.recorder.is_some() {
            return Err(CameraError::rejected("recording already active"));
        }

        let source = open_device(&self.device_path)?;
        let sink = File::create(path).map_err(|e| CameraError::io(path, e))?;

        self.controls.set_quality(quality);
        let worker = StreamWorker::spawn(
            "onboard-v1-record",
            Box::new(source),
            Box::new(sink),
            Arc::clone(&self.controls),
        )
        .map_err(|e| CameraError::io(path, e))?;

        self.recorder = Some(worker);
        info!("Started recording: {}", path.display());
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<(), CameraError> {
        if let Some(worker) = self.recorder.take() {
            let faulted = worker.faulted();
            worker.stop();
            if faulted {
                warn!("Recording worker had faulted before stop");
            }
            info!("Stopped recording");
        }
        Ok(())
    }

    async fn start_preview(&mut self) -> Result<(), CameraError> {
        self.previewing = true;
        info!("Started preview");
        Ok(())
    }

    async fn stop_preview(&mut self) -> Result<(), CameraError> {
        self.previewing = false;
        info!("Stopped preview");
        Ok(())
    }

    async fn toggle_zoom(&mut self) -> Result<(), CameraError> {
        if self.zoomed {
            self.controls.set_crop(CropWindow::full());
        } else {
            self.controls.set_crop(self.zoom_window());
        }
        self.zoomed = !self.zoomed;
        debug!("Zoom {}", if self.zoomed { "on" } else { "off" });
        Ok(())
    }

    fn set_timestamp_overlay(&mut self, text: &str) {
        self.controls.set_annotation(text);
    }

    async fn release(&mut self) -> Result<(), CameraError> {
        self.stop_recording().await?;
        self.stop_preview().await?;
        info!("Released onboard camera (legacy stack)");
        Ok(())
    }
}

/// Onboard sensor camera through the current vendor capture stack.
///
/// Differs from the legacy generation where the vendor APIs diverge:
/// the overlay is stamped per frame rather than stored as a property,
/// zoom animates through a stepped scaler-crop walk, and the pipeline
/// muxes into a container instead of emitting a raw elementary stream.
pub struct OnboardCameraV2 {
    device_path: PathBuf,
    controls: Arc<PipelineControls>,
    recorder: Option<StreamWorker>,
    previewing: bool,
    zoomed: bool,
}

impl OnboardCameraV2 {
    pub fn new(config: &CameraConfig) -> Result<Self, CameraError> {
        let device_path = PathBuf::from(&config.device_path);
        probe_device(&device_path)?;

        info!(
            "Onboard camera (current stack) on {} at {}x{} rot {} @ {} fps",
            device_path.display(),
            config.resolution.0,
            config.resolution.1,
            config.rotation,
            config.framerate
        );

        Ok(Self {
            device_path,
            controls: PipelineControls::new(),
            recorder: None,
            previewing: false,
            zoomed: false,
        })
    }

    #[cfg(test)]
    pub(crate) fn controls(&self) -> Arc<PipelineControls> {
        Arc::clone(&self.controls)
    }
}

#[async_trait]
impl CameraBackend for OnboardCameraV2 {
    fn extension(&self) -> &'static str {
        "mp4"
    }

    async fn start_recording(&mut self, path: &Path, quality: u32) -> Result<(), CameraError> {
        if self.recorder.is_some() {
            return Err(CameraError::rejected("recording already active"));
        }

        let source = open_device(&self.device_path)?;
        let sink = File::create(path).map_err(|e| CameraError::io(path, e))?;

        self.controls.set_quality(quality);
        let worker = StreamWorker::spawn(
            "onboard-v2-record",
            Box::new(source),
            Box::new(sink),
            Arc::clone(&self.controls),
        )
        .map_err(|e| CameraError::io(path, e))?;

        self.recorder = Some(worker);
        info!("Started recording: {}", path.display());
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<(), CameraError> {
        if let Some(worker) = self.recorder.take() {
            let faulted = worker.faulted();
            worker.stop();
            if faulted {
                warn!("Recording worker had faulted before stop");
            }
            info!("Stopped recording");
        }
        Ok(())
    }

    async fn start_preview(&mut self) -> Result<(), CameraError> {
        // The current stack swaps the null preview sink for the windowed
        // one; the sensor keeps running either way.
        self.previewing = true;
        info!("Started preview");
        Ok(())
    }

    async fn stop_preview(&mut self) -> Result<(), CameraError> {
        self.previewing = false;
        info!("Stopped preview");
        Ok(())
    }

    async fn toggle_zoom(&mut self) -> Result<(), CameraError> {
        let mut crop = self.controls.crop();

        if !self.zoomed {
            for _ in 0..ZOOM_STEPS {
                crop = CropWindow::centered(
                    crop.width * ZOOM_IN_FACTOR,
                    crop.height * ZOOM_IN_FACTOR,
                );
                self.controls.set_crop(crop);
            }
        } else {
            for _ in 0..ZOOM_STEPS {
                crop = CropWindow::centered(
                    (crop.width * ZOOM_OUT_FACTOR).min(1.0),
                    (crop.height * ZOOM_OUT_FACTOR).min(1.0),
                );
                self.controls.set_crop(crop);
            }
            // Integer stepping undershoots the sensor edges; land exactly.
            self.controls.set_crop(CropWindow::full());
        }

        self.zoomed = !self.zoomed;
        debug!("Zoom {}", if self.zoomed { "on" } else { "off" });
        Ok(())
    }

    fn set_timestamp_overlay(&mut self, text: &str) {
        self.controls.set_annotation(text);
    }

    async fn release(&mut self) -> Result<(), CameraError> {
        self.stop_recording().await?;
        self.stop_preview().await?;
        info!("Released onboard camera (current stack)");
        Ok(())
    }
}

fn probe_device(device_path: &Path) -> Result<(), CameraError> {
    if device_path.exists() {
        Ok(())
    } else {
        Err(CameraError::disconnected(format!(
            "capture device {} not present",
            device_path.display()
        )))
    }
}

fn open_device(device_path: &Path) -> Result<File, CameraError> {
    File::open(device_path).map_err(|e| {
        CameraError::disconnected(format!(
            "capture device {} unavailable: {}",
            device_path.display(),
            e
        ))
    })
}
