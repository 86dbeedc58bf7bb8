// Core modules
pub mod camera;
pub mod cli;
pub mod common;
pub mod core;
pub mod enroll;

// Re-export commonly used types
pub use camera::{CameraController, CapturedImage, V4lDevice, VideoDevice};
pub use common::{Config, DevMode, EnrollError, Result};
pub use core::{DetectionResult, DetectorMode, FaceBox, FaceDetector, Orientation, Pose};
pub use enroll::{CaptureSession, CapturedPhoto, Enrollment, EnrollmentSettings, FormField};
