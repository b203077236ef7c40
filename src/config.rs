use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FieldcamConfig {
    pub camera: CameraConfig,
    pub recording: RecordingConfig,
    pub storage: StorageConfig,
    pub ptz: PtzConfig,
    pub motion: MotionConfig,
    pub system: SystemConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

/// Which backend drives the camera hardware.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CameraKind {
    /// Onboard sensor through the legacy vendor capture stack
    OnboardV1,
    /// Onboard sensor through the current vendor capture stack
    OnboardV2,
    /// Remote pan-tilt-zoom network camera
    Ptz,
    /// Scripted stand-in, also used by --dry-run
    Mock,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Backend selection
    #[serde(default = "default_camera_kind")]
    pub kind: CameraKind,

    /// Capture device node for the onboard backends
    #[serde(default = "default_device_path")]
    pub device_path: String,

    /// Sensor capture resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Local preview screen resolution (width, height); also sizes the
    /// v1 crop-zoom window
    #[serde(default = "default_display_resolution")]
    pub display_resolution: (u32, u32),

    /// Sensor rotation in degrees (0, 90, 180, 270)
    #[serde(default = "default_rotation")]
    pub rotation: u32,

    /// Frames per second
    #[serde(default = "default_framerate")]
    pub framerate: u32,

    /// Encoder quality hint passed to the vendor pipeline (lower is better)
    #[serde(default = "default_video_quality")]
    pub video_quality: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecordingConfig {
    /// Delay between power-on and the first recording attempt
    #[serde(default = "default_pause_before_record")]
    pub pause_before_record_seconds: u64,

    /// Length of one video segment before rollover
    #[serde(default = "default_segment_duration")]
    pub segment_duration_seconds: u64,

    /// Expected size of one finished segment
    #[serde(default = "default_avg_video_file_size")]
    pub avg_video_file_size_mb: u64,

    /// Multiplier applied to the expected size when checking free space
    #[serde(default = "default_file_size_safety_factor")]
    pub file_size_safety_factor: f64,

    /// Headroom the home directory must keep for the OS when used as a
    /// fallback destination
    #[serde(default = "default_reserved_storage")]
    pub reserved_storage_mb: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Directory holding removable media mounts; empty means
    /// /media/<current user>
    #[serde(default = "default_media_root")]
    pub media_root: String,

    /// Fallback destination; empty means the user's home directory
    #[serde(default = "default_home_dir")]
    pub home_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PtzConfig {
    /// Camera address; required when camera.kind = "ptz"
    #[serde(default = "default_ptz_host")]
    pub host: String,

    /// Control channel port
    #[serde(default = "default_control_port")]
    pub control_port: u16,

    /// Video stream port
    #[serde(default = "default_stream_port")]
    pub stream_port: u16,

    #[serde(default = "default_pan_min")]
    pub pan_min: f64,
    #[serde(default = "default_pan_max")]
    pub pan_max: f64,
    #[serde(default = "default_tilt_min")]
    pub tilt_min: f64,
    #[serde(default = "default_tilt_max")]
    pub tilt_max: f64,
    #[serde(default = "default_zoom_min")]
    pub zoom_min: f64,
    #[serde(default = "default_zoom_max")]
    pub zoom_max: f64,

    /// Continuous-rotation mount: pan wraps instead of clamping
    #[serde(default = "default_infinite_pan")]
    pub infinite_pan: bool,

    /// Position issued once when the control channel comes up
    #[serde(default = "default_home_pan")]
    pub home_pan: f64,
    #[serde(default = "default_home_tilt")]
    pub home_tilt: f64,
    #[serde(default = "default_home_zoom")]
    pub home_zoom: f64,

    /// Connection attempts before startup gives up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MotionConfig {
    /// Pan delta per input event
    #[serde(default = "default_pan_step")]
    pub pan_step: f64,

    /// Tilt delta per input event
    #[serde(default = "default_tilt_step")]
    pub tilt_step: f64,

    /// Zoom delta per input event
    #[serde(default = "default_zoom_step")]
    pub zoom_step: f64,

    /// Multiplier applied to deltas while fine movement is held
    #[serde(default = "default_fine_scale")]
    pub fine_scale: f64,

    /// Minimum interval between accepted commands
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Pan slowdown with zoom: deltas scale by 1 / (1 + zoom * this)
    #[serde(default = "default_zoom_pan_scale")]
    pub zoom_pan_scale: f64,

    /// Camera is mounted dome-down; x/y input is inverted
    #[serde(default = "default_inverted_mount")]
    pub inverted_mount: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Recording controller tick period
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Button poll period
    #[serde(default = "default_button_poll_interval_ms")]
    pub button_poll_interval_ms: u64,

    /// Drive motion and toggles from the terminal (debugging without the
    /// physical controls)
    #[serde(default = "default_keyboard_input")]
    pub keyboard_input: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelemetryConfig {
    /// Enable the solar charge-controller log
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    /// CSV destination; relative paths resolve against the home directory
    #[serde(default = "default_telemetry_csv_path")]
    pub csv_path: String,

    /// Seconds between rows
    #[serde(default = "default_telemetry_interval")]
    pub interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Directory for daily-rolling log files; empty disables file logging
    #[serde(default = "default_log_directory")]
    pub directory: String,
}

impl FieldcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("fieldcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("camera.kind", "onboard-v2")?
            .set_default("camera.device_path", default_device_path())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default(
                "camera.display_resolution",
                vec![
                    default_display_resolution().0,
                    default_display_resolution().1,
                ],
            )?
            .set_default("camera.rotation", default_rotation())?
            .set_default("camera.framerate", default_framerate())?
            .set_default("camera.video_quality", default_video_quality())?
            .set_default(
                "recording.pause_before_record_seconds",
                default_pause_before_record(),
            )?
            .set_default(
                "recording.segment_duration_seconds",
                default_segment_duration(),
            )?
            .set_default(
                "recording.avg_video_file_size_mb",
                default_avg_video_file_size(),
            )?
            .set_default(
                "recording.file_size_safety_factor",
                default_file_size_safety_factor(),
            )?
            .set_default("recording.reserved_storage_mb", default_reserved_storage())?
            .set_default("storage.media_root", default_media_root())?
            .set_default("storage.home_dir", default_home_dir())?
            .set_default("ptz.host", default_ptz_host())?
            .set_default("ptz.control_port", default_control_port())?
            .set_default("ptz.stream_port", default_stream_port())?
            .set_default("ptz.pan_min", default_pan_min())?
            .set_default("ptz.pan_max", default_pan_max())?
            .set_default("ptz.tilt_min", default_tilt_min())?
            .set_default("ptz.tilt_max", default_tilt_max())?
            .set_default("ptz.zoom_min", default_zoom_min())?
            .set_default("ptz.zoom_max", default_zoom_max())?
            .set_default("ptz.infinite_pan", default_infinite_pan())?
            .set_default("ptz.home_pan", default_home_pan())?
            .set_default("ptz.home_tilt", default_home_tilt())?
            .set_default("ptz.home_zoom", default_home_zoom())?
            .set_default("ptz.connect_attempts", default_connect_attempts())?
            .set_default("motion.pan_step", default_pan_step())?
            .set_default("motion.tilt_step", default_tilt_step())?
            .set_default("motion.zoom_step", default_zoom_step())?
            .set_default("motion.fine_scale", default_fine_scale())?
            .set_default("motion.min_interval_ms", default_min_interval_ms())?
            .set_default("motion.zoom_pan_scale", default_zoom_pan_scale())?
            .set_default("motion.inverted_mount", default_inverted_mount())?
            .set_default("system.tick_interval_ms", default_tick_interval_ms())?
            .set_default(
                "system.button_poll_interval_ms",
                default_button_poll_interval_ms(),
            )?
            .set_default("system.keyboard_input", default_keyboard_input())?
            .set_default("telemetry.enabled", default_telemetry_enabled())?
            .set_default("telemetry.csv_path", default_telemetry_csv_path())?
            .set_default("telemetry.interval_seconds", default_telemetry_interval())?
            .set_default("logging.directory", default_log_directory())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with FIELDCAM_ prefix
            .add_source(Environment::with_prefix("FIELDCAM").separator("__"))
            .build()?;

        let config: FieldcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.display_resolution.0 == 0 || self.camera.display_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Display resolution must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.camera.rotation, 0 | 90 | 180 | 270) {
            return Err(ConfigError::Message(
                "Camera rotation must be one of 0, 90, 180, 270".to_string(),
            ));
        }

        if self.camera.framerate == 0 {
            return Err(ConfigError::Message(
                "Camera framerate must be greater than 0".to_string(),
            ));
        }

        if self.camera.video_quality == 0 || self.camera.video_quality > 51 {
            return Err(ConfigError::Message(
                "Video quality must be between 1 and 51".to_string(),
            ));
        }

        if self.recording.segment_duration_seconds == 0 {
            return Err(ConfigError::Message(
                "Segment duration must be greater than 0".to_string(),
            ));
        }

        if self.recording.avg_video_file_size_mb == 0 {
            return Err(ConfigError::Message(
                "Average video file size must be greater than 0".to_string(),
            ));
        }

        if self.recording.file_size_safety_factor < 1.0 {
            return Err(ConfigError::Message(
                "File size safety factor must be at least 1.0".to_string(),
            ));
        }

        if self.camera.kind == CameraKind::Ptz && self.ptz.host.is_empty() {
            return Err(ConfigError::Message(
                "ptz.host is required when camera.kind is \"ptz\"".to_string(),
            ));
        }

        if self.ptz.pan_min >= self.ptz.pan_max
            || self.ptz.tilt_min >= self.ptz.tilt_max
            || self.ptz.zoom_min >= self.ptz.zoom_max
        {
            return Err(ConfigError::Message(
                "PTZ axis minimums must be below their maximums".to_string(),
            ));
        }

        if self.ptz.connect_attempts == 0 {
            return Err(ConfigError::Message(
                "PTZ connect attempts must be greater than 0".to_string(),
            ));
        }

        if self.motion.pan_step <= 0.0 || self.motion.tilt_step <= 0.0 || self.motion.zoom_step <= 0.0
        {
            return Err(ConfigError::Message(
                "Motion step sizes must be greater than 0".to_string(),
            ));
        }

        if self.motion.fine_scale <= 0.0 || self.motion.fine_scale > 1.0 {
            return Err(ConfigError::Message(
                "Fine movement scale must be in (0, 1]".to_string(),
            ));
        }

        if self.system.tick_interval_ms == 0 || self.system.button_poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Tick and button poll intervals must be greater than 0".to_string(),
            ));
        }

        if self.telemetry.enabled && self.telemetry.interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Telemetry interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl RecordingConfig {
    pub fn pause_before_record(&self) -> Duration {
        Duration::from_secs(self.pause_before_record_seconds)
    }

    pub fn segment_duration(&self) -> Duration {
        Duration::from_secs(self.segment_duration_seconds)
    }

    /// Free space one segment needs, in GB, with the safety factor applied.
    pub fn required_gb(&self) -> f64 {
        self.avg_video_file_size_mb as f64 / 1000.0 * self.file_size_safety_factor
    }

    /// Extra headroom the home directory must keep, in GB.
    pub fn reserved_home_gb(&self) -> f64 {
        self.reserved_storage_mb as f64 / 1000.0
    }
}

impl MotionConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl SystemConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn button_poll_interval(&self) -> Duration {
        Duration::from_millis(self.button_poll_interval_ms)
    }
}

impl Default for FieldcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            recording: RecordingConfig::default(),
            storage: StorageConfig::default(),
            ptz: PtzConfig::default(),
            motion: MotionConfig::default(),
            system: SystemConfig::default(),
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            kind: default_camera_kind(),
            device_path: default_device_path(),
            resolution: default_camera_resolution(),
            display_resolution: default_display_resolution(),
            rotation: default_rotation(),
            framerate: default_framerate(),
            video_quality: default_video_quality(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            pause_before_record_seconds: default_pause_before_record(),
            segment_duration_seconds: default_segment_duration(),
            avg_video_file_size_mb: default_avg_video_file_size(),
            file_size_safety_factor: default_file_size_safety_factor(),
            reserved_storage_mb: default_reserved_storage(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_root: default_media_root(),
            home_dir: default_home_dir(),
        }
    }
}

impl Default for PtzConfig {
    fn default() -> Self {
        Self {
            host: default_ptz_host(),
            control_port: default_control_port(),
            stream_port: default_stream_port(),
            pan_min: default_pan_min(),
            pan_max: default_pan_max(),
            tilt_min: default_tilt_min(),
            tilt_max: default_tilt_max(),
            zoom_min: default_zoom_min(),
            zoom_max: default_zoom_max(),
            infinite_pan: default_infinite_pan(),
            home_pan: default_home_pan(),
            home_tilt: default_home_tilt(),
            home_zoom: default_home_zoom(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            pan_step: default_pan_step(),
            tilt_step: default_tilt_step(),
            zoom_step: default_zoom_step(),
            fine_scale: default_fine_scale(),
            min_interval_ms: default_min_interval_ms(),
            zoom_pan_scale: default_zoom_pan_scale(),
            inverted_mount: default_inverted_mount(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            button_poll_interval_ms: default_button_poll_interval_ms(),
            keyboard_input: default_keyboard_input(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            csv_path: default_telemetry_csv_path(),
            interval_seconds: default_telemetry_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
        }
    }
}

// Default value functions
fn default_camera_kind() -> CameraKind {
    CameraKind::OnboardV2
}
fn default_device_path() -> String {
    "/dev/video0".to_string()
}
fn default_camera_resolution() -> (u32, u32) {
    (1920, 1080)
}
fn default_display_resolution() -> (u32, u32) {
    (320, 240)
}
fn default_rotation() -> u32 {
    0
}
fn default_framerate() -> u32 {
    30
}
fn default_video_quality() -> u32 {
    25
}

fn default_pause_before_record() -> u64 {
    60
}
fn default_segment_duration() -> u64 {
    300
}
fn default_avg_video_file_size() -> u64 {
    400
}
fn default_file_size_safety_factor() -> f64 {
    1.5
}
fn default_reserved_storage() -> u64 {
    5000
}

fn default_media_root() -> String {
    String::new()
}
fn default_home_dir() -> String {
    String::new()
}

fn default_ptz_host() -> String {
    String::new()
}
fn default_control_port() -> u16 {
    5678
}
fn default_stream_port() -> u16 {
    8554
}
fn default_pan_min() -> f64 {
    -1.0
}
fn default_pan_max() -> f64 {
    1.0
}
fn default_tilt_min() -> f64 {
    -1.0
}
fn default_tilt_max() -> f64 {
    1.0
}
fn default_zoom_min() -> f64 {
    0.0
}
fn default_zoom_max() -> f64 {
    1.0
}
fn default_infinite_pan() -> bool {
    false
}
fn default_home_pan() -> f64 {
    0.0
}
fn default_home_tilt() -> f64 {
    0.0
}
fn default_home_zoom() -> f64 {
    0.0
}
fn default_connect_attempts() -> u32 {
    5
}

fn default_pan_step() -> f64 {
    0.05
}
fn default_tilt_step() -> f64 {
    0.05
}
fn default_zoom_step() -> f64 {
    0.07
}
fn default_fine_scale() -> f64 {
    1.0 / 3.0
}
fn default_min_interval_ms() -> u64 {
    250
}
fn default_zoom_pan_scale() -> f64 {
    5.0
}
fn default_inverted_mount() -> bool {
    false
}

fn default_tick_interval_ms() -> u64 {
    100
}
fn default_button_poll_interval_ms() -> u64 {
    50
}
fn default_keyboard_input() -> bool {
    false
}

fn default_telemetry_enabled() -> bool {
    false
}
fn default_telemetry_csv_path() -> String {
    "solar.csv".to_string()
}
fn default_telemetry_interval() -> u64 {
    600
}

fn default_log_directory() -> String {
    String::new()
}
