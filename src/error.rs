use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FieldcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl FieldcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Faults a camera backend can raise toward the recording controller.
///
/// `Io` covers a destination file or local pipeline that cannot be
/// opened; `Disconnected` covers the device itself being unreachable, so
/// the status surface can show a device fault instead of cycling media.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Camera unreachable: {details}")]
    Disconnected { details: String },

    #[error("Backend rejected request: {details}")]
    Rejected { details: String },
}

impl CameraError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn disconnected<S: Into<String>>(details: S) -> Self {
        Self::Disconnected {
            details: details.into(),
        }
    }

    pub fn rejected<S: Into<String>>(details: S) -> Self {
        Self::Rejected {
            details: details.into(),
        }
    }

    /// True when the fault is device-level rather than a local file problem.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}

/// Reasons a recording attempt did not start.
///
/// Both variants are recoverable: the controller absorbs them into a
/// state decision and the next tick retries.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("No storage destination met the free-space requirement")]
    StorageUnavailable,

    #[error(transparent)]
    Camera(#[from] CameraError),
}

pub type Result<T> = std::result::Result<T, FieldcamError>;
