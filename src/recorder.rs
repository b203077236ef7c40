use crate::camera::CameraBackend;
use crate::config::FieldcamConfig;
use crate::error::{CameraError, RecorderError};
use crate::storage::StorageSelector;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DAY_DIR_FORMAT: &str = "%Y-%m-%d";
const SEGMENT_STAMP_FORMAT: &str = "%Y-%m-%d_%Hh%Mm%Ss";
const OVERLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One active segment being written.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    /// Monotonic start, drives rollover timing.
    pub started: Instant,
    /// Full path of the segment file.
    pub destination: PathBuf,
    /// Mount the segment lives on, re-queried for free space.
    pub mount: PathBuf,
    /// Position of this segment in the run, counted from 1.
    pub index: u64,
}

/// Lifecycle of the recorder. Exactly one state holds at any time, and
/// only [`RecordingController`] transitions between them.
#[derive(Debug, Clone)]
pub enum RecorderState {
    /// Startup pause before the first automatic recording. The deadline
    /// is fixed at construction and never advanced, so failed start
    /// attempts show an expired countdown instead of a looping one.
    AwaitingFirstRecording { deadline: Instant },
    /// Not recording; nothing happens until a toggle.
    Idle,
    /// Writing a segment, rolling over when it reaches full length.
    Recording { session: RecordingSession },
}

/// Display-oriented reduction of [`RecorderState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderPhase {
    Waiting,
    Idle,
    Recording,
}

/// Snapshot of everything the status surfaces poll. Cheap to clone and
/// carries no live handles.
#[derive(Debug, Clone)]
pub struct RecorderStatus {
    pub phase: RecorderPhase,
    pub recording: bool,
    /// Remaining startup pause; zero once the deadline has passed.
    pub countdown_remaining: Option<Duration>,
    pub segment_elapsed: Option<Duration>,
    pub segment_remaining: Option<Duration>,
    /// Most recent segment file, kept after recording stops.
    pub destination: Option<PathBuf>,
    pub free_space_gb: f64,
    pub sequence_index: u64,
    pub previewing: bool,
    /// Set while the camera itself is unreachable, as opposed to
    /// storage being full.
    pub device_fault: Option<String>,
}

impl Default for RecorderStatus {
    fn default() -> Self {
        Self {
            phase: RecorderPhase::Waiting,
            recording: false,
            countdown_remaining: None,
            segment_elapsed: None,
            segment_remaining: None,
            destination: None,
            free_space_gb: 0.0,
            sequence_index: 0,
            previewing: false,
            device_fault: None,
        }
    }
}

enum TickAction {
    None,
    FirstStart,
    Rollover,
}

/// Owns the camera backend and the whole recording lifecycle.
///
/// Driven by two callers that must share one mutex: the periodic tick
/// loop, and the button loop invoking the toggles. Nothing here blocks
/// beyond bounded filesystem calls; long camera work happens inside the
/// backends' own workers.
pub struct RecordingController {
    camera: Box<dyn CameraBackend>,
    storage: StorageSelector,
    state: RecorderState,
    sequence_index: u64,
    previewing: bool,
    device_fault: Option<String>,
    last_mount: Option<PathBuf>,
    last_destination: Option<PathBuf>,
    consecutive_begin_failures: u32,
    required_gb: f64,
    reserved_home_gb: f64,
    segment_duration: Duration,
    video_quality: u32,
}

impl RecordingController {
    pub fn new(
        camera: Box<dyn CameraBackend>,
        storage: StorageSelector,
        config: &FieldcamConfig,
        now: Instant,
    ) -> Self {
        let pause = config.recording.pause_before_record();
        info!(
            "Recorder armed: first recording in {}s, {}s segments",
            pause.as_secs(),
            config.recording.segment_duration_seconds
        );

        Self {
            camera,
            storage,
            state: RecorderState::AwaitingFirstRecording {
                deadline: now + pause,
            },
            sequence_index: 0,
            previewing: false,
            device_fault: None,
            last_mount: None,
            last_destination: None,
            consecutive_begin_failures: 0,
            required_gb: config.recording.required_gb(),
            reserved_home_gb: config.recording.reserved_home_gb(),
            segment_duration: config.recording.segment_duration(),
            video_quality: config.camera.video_quality,
        }
    }

    pub fn state(&self) -> &RecorderState {
        &self.state
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording { .. })
    }

    pub fn is_previewing(&self) -> bool {
        self.previewing
    }

    /// Advance the lifecycle. Called at a fixed short period; the only
    /// writer of [`RecorderState`].
    pub async fn tick(&mut self, now: Instant) {
        let stamp = Local::now();
        self.camera
            .set_timestamp_overlay(&stamp.format(OVERLAY_FORMAT).to_string());

        let action = match &self.state {
            RecorderState::AwaitingFirstRecording { deadline } if now >= *deadline => {
                TickAction::FirstStart
            }
            RecorderState::Recording { session }
                if now.saturating_duration_since(session.started) >= self.segment_duration =>
            {
                TickAction::Rollover
            }
            _ => TickAction::None,
        };

        match action {
            TickAction::None => {}
            TickAction::FirstStart => match self.begin_recording(now).await {
                Ok(session) => {
                    self.state = RecorderState::Recording { session };
                }
                Err(e) => self.note_begin_failure("First recording attempt", &e),
            },
            TickAction::Rollover => {
                if let Err(e) = self.camera.stop_recording().await {
                    warn!("Rollover stop failed: {}", e);
                }
                match self.begin_recording(now).await {
                    Ok(session) => {
                        debug!("Rolled over to segment {}", session.index);
                        self.state = RecorderState::Recording { session };
                    }
                    Err(e) => {
                        self.note_begin_failure("Rollover", &e);
                        warn!("Recording stopped: could not open the next segment");
                        self.state = RecorderState::Idle;
                    }
                }
            }
        }
    }

    /// Flip recording on or off.
    ///
    /// During the startup pause the press is ignored until the deadline
    /// passes; once it has, a press cancels the automatic retry instead
    /// of fighting it.
    pub async fn toggle_recording(&mut self, now: Instant) {
        match &self.state {
            RecorderState::AwaitingFirstRecording { deadline } => {
                if now < *deadline {
                    debug!("Record toggle ignored during startup pause");
                } else {
                    info!("Automatic recording cancelled by operator");
                    self.state = RecorderState::Idle;
                }
            }
            RecorderState::Idle => match self.begin_recording(now).await {
                Ok(session) => {
                    self.state = RecorderState::Recording { session };
                }
                Err(e) => self.note_begin_failure("Manual start", &e),
            },
            RecorderState::Recording { .. } => {
                if let Err(e) = self.camera.stop_recording().await {
                    warn!("Stop failed: {}", e);
                }
                info!("Recording stopped by operator");
                self.state = RecorderState::Idle;
            }
        }
    }

    /// Zoom never fails the controller; backend errors are logged and
    /// the press is dropped.
    pub async fn toggle_zoom(&mut self) {
        if let Err(e) = self.camera.toggle_zoom().await {
            warn!("Zoom toggle failed: {}", e);
        }
    }

    pub async fn toggle_preview(&mut self) {
        let result = if self.previewing {
            self.camera.stop_preview().await
        } else {
            self.camera.start_preview().await
        };
        match result {
            Ok(()) => self.previewing = !self.previewing,
            Err(e) => warn!("Preview toggle failed: {}", e),
        }
    }

    /// Free space at the active destination, in GB. A vanished mount
    /// reads as zero, never an error.
    pub fn current_free_space(&self) -> f64 {
        let path: &Path = match (&self.state, &self.last_mount) {
            (RecorderState::Recording { session }, _) => &session.mount,
            (_, Some(mount)) => mount,
            _ => self.storage.home_dir(),
        };
        self.storage.free_gb(path)
    }

    pub fn status(&self, now: Instant) -> RecorderStatus {
        let (phase, countdown, elapsed, remaining) = match &self.state {
            RecorderState::AwaitingFirstRecording { deadline } => (
                RecorderPhase::Waiting,
                Some(deadline.saturating_duration_since(now)),
                None,
                None,
            ),
            RecorderState::Idle => (RecorderPhase::Idle, None, None, None),
            RecorderState::Recording { session } => {
                let elapsed = now.saturating_duration_since(session.started);
                let remaining = self.segment_duration.saturating_sub(elapsed);
                (RecorderPhase::Recording, None, Some(elapsed), Some(remaining))
            }
        };

        RecorderStatus {
            phase,
            recording: matches!(phase, RecorderPhase::Recording),
            countdown_remaining: countdown,
            segment_elapsed: elapsed,
            segment_remaining: remaining,
            destination: self.last_destination.clone(),
            free_space_gb: self.current_free_space(),
            sequence_index: self.sequence_index,
            previewing: self.previewing,
            device_fault: self.device_fault.clone(),
        }
    }

    /// Stop everything and release the camera for process exit.
    pub async fn release(&mut self) {
        if self.is_recording() {
            if let Err(e) = self.camera.stop_recording().await {
                warn!("Stop during shutdown failed: {}", e);
            }
            self.state = RecorderState::Idle;
        }
        if self.previewing {
            if let Err(e) = self.camera.stop_preview().await {
                warn!("Preview stop during shutdown failed: {}", e);
            }
            self.previewing = false;
        }
        if let Err(e) = self.camera.release().await {
            warn!("Camera release failed: {}", e);
        }
        info!("Recorder released");
    }

    /// Select a destination, lay out the dated directory, and start the
    /// backend on a fresh timestamped segment file.
    async fn begin_recording(&mut self, now: Instant) -> Result<RecordingSession, RecorderError> {
        let mount = self
            .storage
            .select(self.required_gb, self.reserved_home_gb)
            .ok_or(RecorderError::StorageUnavailable)?;

        let stamp = Local::now();
        let day_dir = mount.join(stamp.format(DAY_DIR_FORMAT).to_string());
        std::fs::create_dir_all(&day_dir)
            .map_err(|e| RecorderError::Camera(CameraError::io(&day_dir, e)))?;

        let destination = day_dir.join(format!(
            "{}.{}",
            stamp.format(SEGMENT_STAMP_FORMAT),
            self.camera.extension()
        ));

        self.camera
            .start_recording(&destination, self.video_quality)
            .await?;

        self.sequence_index += 1;
        self.device_fault = None;
        self.consecutive_begin_failures = 0;
        self.last_mount = Some(mount.clone());
        self.last_destination = Some(destination.clone());
        info!(
            "Recording segment {} to {}",
            self.sequence_index,
            destination.display()
        );

        Ok(RecordingSession {
            started: now,
            destination,
            mount,
            index: self.sequence_index,
        })
    }

    /// Log a failed start without flooding: first failure of a run at
    /// warn, repeats at debug until something succeeds.
    fn note_begin_failure(&mut self, context: &str, error: &RecorderError) {
        if let RecorderError::Camera(e) = error {
            if e.is_disconnect() {
                self.device_fault = Some(e.to_string());
            }
        }

        self.consecutive_begin_failures = self.consecutive_begin_failures.saturating_add(1);
        if self.consecutive_begin_failures == 1 {
            warn!("{} failed: {}", context, error);
        } else {
            debug!(
                "{} failed ({} consecutive): {}",
                context, self.consecutive_begin_failures, error
            );
        }
    }
}
