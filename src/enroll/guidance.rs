use crate::core::{pose_matches, DetectionResult};
use crate::enroll::session::AngleStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Warning,
    Success,
}

/// What the user is told for the current step and frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Guidance {
    pub title: String,
    pub message: String,
    pub tone: Tone,
    pub face_detected: bool,
    /// Pose matches the target; capture is always allowed, this only highlights it.
    pub capture_highlighted: bool,
}

/// Recomputed from scratch on every tick; no history is consulted.
pub fn render_guidance(
    required: &[AngleStep],
    current_step: usize,
    detection: Option<&DetectionResult>,
) -> Guidance {
    let Some(target) = required.get(current_step) else {
        return Guidance {
            title: "All angles captured".to_string(),
            message: "Press F to submit, or capture again to retake the last photo".to_string(),
            tone: Tone::Success,
            face_detected: detection.is_some(),
            capture_highlighted: false,
        };
    };

    let title = format!("Step {}/{}: {}", current_step + 1, required.len(), target.title);

    let Some(detection) = detection else {
        return Guidance {
            title,
            message: "No face detected - position your face inside the frame".to_string(),
            tone: Tone::Warning,
            face_detected: false,
            capture_highlighted: false,
        };
    };

    if !detection.has_landmarks() {
        return Guidance {
            title,
            message: format!("Face detected. {}", target.instruction),
            tone: Tone::Info,
            face_detected: true,
            capture_highlighted: false,
        };
    }

    let detected = detection.orientation.orientation;
    if pose_matches(target.pose, detected) {
        Guidance {
            title,
            message: "Good - hold still and capture".to_string(),
            tone: Tone::Success,
            face_detected: true,
            capture_highlighted: true,
        }
    } else {
        Guidance {
            title,
            message: format!("Detected: {}. {}", detected.as_str(), target.instruction),
            tone: Tone::Warning,
            face_detected: true,
            capture_highlighted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FaceBox, Landmarks, Lighting, Orientation, OrientationEstimate};
    use crate::enroll::session::REQUIRED_ANGLES;

    fn detection(orientation: Option<Orientation>) -> DetectionResult {
        DetectionResult {
            face: FaceBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0, confidence: 0.9 },
            landmarks: orientation.map(|_| Landmarks {
                left_eye: vec![],
                right_eye: vec![],
                nose: vec![],
                mouth: vec![],
            }),
            orientation: orientation
                .map(|o| OrientationEstimate { orientation: o, confidence: 0.8 })
                .unwrap_or_else(OrientationEstimate::unknown),
            lighting: Lighting::Adequate,
        }
    }

    #[test]
    fn no_face_warns() {
        let g = render_guidance(&REQUIRED_ANGLES, 0, None);
        assert_eq!(g.tone, Tone::Warning);
        assert!(!g.face_detected);
        assert!(!g.capture_highlighted);
        assert_eq!(g.title, "Step 1/5: Front");
    }

    #[test]
    fn matching_pose_highlights_capture() {
        let g = render_guidance(&REQUIRED_ANGLES, 1, Some(&detection(Some(Orientation::Left))));
        assert!(g.capture_highlighted);
        assert_eq!(g.tone, Tone::Success);
    }

    #[test]
    fn front_face_satisfies_vertical_steps() {
        let front = detection(Some(Orientation::Front));
        assert!(render_guidance(&REQUIRED_ANGLES, 3, Some(&front)).capture_highlighted);
        assert!(render_guidance(&REQUIRED_ANGLES, 4, Some(&front)).capture_highlighted);
        assert!(!render_guidance(&REQUIRED_ANGLES, 2, Some(&front)).capture_highlighted);
    }

    #[test]
    fn wrong_pose_names_what_was_seen() {
        let g = render_guidance(&REQUIRED_ANGLES, 2, Some(&detection(Some(Orientation::Left))));
        assert!(!g.capture_highlighted);
        assert!(g.message.starts_with("Detected: left."));
    }

    #[test]
    fn basic_detector_never_highlights() {
        let g = render_guidance(&REQUIRED_ANGLES, 0, Some(&detection(None)));
        assert!(g.face_detected);
        assert!(!g.capture_highlighted);
        assert_eq!(g.tone, Tone::Info);
    }

    #[test]
    fn finished_session_offers_submit() {
        let g = render_guidance(&REQUIRED_ANGLES, 5, None);
        assert_eq!(g.title, "All angles captured");
    }
}
