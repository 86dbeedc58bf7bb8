pub mod detection;
pub mod detector;
pub mod onnx;
pub mod orientation;
pub mod skin;

pub use detection::{DetectionResult, FaceBox, Landmarks, ModelDetection, Point};
pub use detector::{DetectorMode, FaceDetector, LandmarkModel};
pub use orientation::{
    classify_lighting, classify_orientation, pose_matches, Lighting, Orientation,
    OrientationEstimate, Pose,
};
pub use onnx::load_configured_detector;
