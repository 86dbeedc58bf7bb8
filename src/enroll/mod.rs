pub mod guidance;
pub mod orchestrator;
pub mod poller;
pub mod session;

pub use guidance::{render_guidance, Guidance, Tone};
pub use orchestrator::{Enrollment, EnrollmentSettings, FormField};
pub use poller::Poller;
pub use session::{
    AngleStep, CaptureOutcome, CaptureSession, CapturedPhoto, SessionState, REQUIRED_ANGLES,
};
