use thiserror::Error;

/// Why the video device could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAccessKind {
    PermissionDenied,
    NotFound,
    Generic,
}

impl DeviceAccessKind {
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => DeviceAccessKind::PermissionDenied,
            std::io::ErrorKind::NotFound => DeviceAccessKind::NotFound,
            _ => DeviceAccessKind::Generic,
        }
    }

    /// Message shown to the user until the page (process) is restarted.
    pub fn user_message(&self) -> &'static str {
        match self {
            DeviceAccessKind::PermissionDenied => {
                "Camera access was denied. Grant access to the video device and restart enrollment."
            }
            DeviceAccessKind::NotFound => {
                "No camera was found. Connect a camera and restart enrollment."
            }
            DeviceAccessKind::Generic => {
                "The camera could not be started. Check that no other program is using it \
                 and restart enrollment."
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("Camera access failed ({kind:?}): {message}")]
    DeviceAccess {
        kind: DeviceAccessKind,
        message: String,
    },

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("No face detected")]
    NoFaceDetected,

    #[error("Camera is not ready for capture")]
    CaptureNotReady,

    #[error("Capture export failed: {0}")]
    CaptureExport(String),

    #[error("No photos captured, nothing to submit")]
    EmptySubmission,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EnrollError>;
