use crate::camera::CapturedImage;
use crate::common::{EnrollError, Result};
use crate::core::Pose;
use serde::{Deserialize, Serialize};

/// One required pose with the text shown while it is the active step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleStep {
    pub pose: Pose,
    pub title: &'static str,
    pub instruction: &'static str,
}

pub const REQUIRED_ANGLES: [AngleStep; 5] = [
    AngleStep {
        pose: Pose::Front,
        title: "Front",
        instruction: "Look straight at the camera",
    },
    AngleStep {
        pose: Pose::Left,
        title: "Left",
        instruction: "Turn your head slightly to the left",
    },
    AngleStep {
        pose: Pose::Right,
        title: "Right",
        instruction: "Turn your head slightly to the right",
    },
    AngleStep {
        pose: Pose::Up,
        title: "Up",
        instruction: "Tilt your head slightly up",
    },
    AngleStep {
        pose: Pose::Down,
        title: "Down",
        instruction: "Tilt your head slightly down",
    },
];

/// A captured still as it is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedPhoto {
    #[serde(rename = "dataURL")]
    pub data_url: String,
    pub angle: Pose,
    /// 1-based index of the step the photo was taken for.
    pub step: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A new photo was appended for this 1-based step.
    Appended { step: usize },
    /// All steps were done; the last photo was replaced.
    Retaken { step: usize },
    /// All steps were skipped, so there is no photo to retake.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Detecting(usize),
    ReadyToCapture(usize),
    AllComplete,
}

/// Photo buffer and step cursor for one enrollment.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    required: &'static [AngleStep],
    current_step: usize,
    photos: Vec<CapturedPhoto>,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            required: &REQUIRED_ANGLES,
            current_step: 0,
            photos: Vec::new(),
        }
    }

    pub fn required_angles(&self) -> &'static [AngleStep] {
        self.required
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn current_target(&self) -> Option<&'static AngleStep> {
        self.required.get(self.current_step)
    }

    pub fn is_complete(&self) -> bool {
        self.current_step >= self.required.len()
    }

    pub fn photos(&self) -> &[CapturedPhoto] {
        &self.photos
    }

    pub fn state(&self, pose_matched: bool) -> SessionState {
        if self.is_complete() {
            SessionState::AllComplete
        } else if pose_matched {
            SessionState::ReadyToCapture(self.current_step)
        } else {
            SessionState::Detecting(self.current_step)
        }
    }

    /// Store a capture: append for the active step, or retake the last photo
    /// once every step has been passed.
    pub fn record_capture(&mut self, image: CapturedImage) -> CaptureOutcome {
        if let Some(target) = self.current_target() {
            let step = self.current_step + 1;
            self.photos.push(CapturedPhoto {
                data_url: image.data_url,
                angle: target.pose,
                step,
            });
            self.current_step += 1;
            return CaptureOutcome::Appended { step };
        }

        match self.photos.last_mut() {
            Some(last) => {
                last.data_url = image.data_url;
                CaptureOutcome::Retaken { step: last.step }
            }
            None => CaptureOutcome::Ignored,
        }
    }

    /// Advance without a photo. Leaves a gap; returns false once complete.
    pub fn skip(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.current_step += 1;
        true
    }

    /// JSON array `[{"dataURL", "angle", "step"}]` for the submission field.
    pub fn to_payload_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.photos)?)
    }

    /// Only emptiness is rejected; skipped angles are allowed through.
    pub fn validate_submission(&self) -> Result<()> {
        if self.photos.is_empty() {
            return Err(EnrollError::EmptySubmission);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(tag: &str) -> CapturedImage {
        CapturedImage {
            data_url: format!("data:image/jpeg;base64,{}", tag),
            mime: "image/jpeg".to_string(),
        }
    }

    fn angles(session: &CaptureSession) -> Vec<Pose> {
        session.photos().iter().map(|p| p.angle).collect()
    }

    #[test]
    fn five_captures_fill_every_angle_in_order() {
        let mut session = CaptureSession::new();
        for i in 0..5 {
            let outcome = session.record_capture(image(&i.to_string()));
            assert_eq!(outcome, CaptureOutcome::Appended { step: i + 1 });
        }

        assert_eq!(
            angles(&session),
            vec![Pose::Front, Pose::Left, Pose::Right, Pose::Up, Pose::Down]
        );
        let steps: Vec<usize> = session.photos().iter().map(|p| p.step).collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5]);
        assert_eq!(session.state(false), SessionState::AllComplete);
    }

    #[test]
    fn sixth_capture_replaces_the_last_photo() {
        let mut session = CaptureSession::new();
        for i in 0..5 {
            session.record_capture(image(&i.to_string()));
        }

        assert_eq!(session.record_capture(image("again")), CaptureOutcome::Retaken { step: 5 });
        assert_eq!(session.photos().len(), 5);
        let last = session.photos().last().unwrap();
        assert_eq!(last.data_url, "data:image/jpeg;base64,again");
        assert_eq!((last.angle, last.step), (Pose::Down, 5));
        assert_eq!(session.current_step(), 5);
    }

    #[test]
    fn skip_leaves_a_gap() {
        let mut session = CaptureSession::new();
        assert!(session.skip());
        for i in 0..4 {
            session.record_capture(image(&i.to_string()));
        }

        assert_eq!(session.photos().len(), 4);
        assert_eq!(angles(&session), vec![Pose::Left, Pose::Right, Pose::Up, Pose::Down]);
        assert_eq!(session.photos()[0].step, 2);
        assert!(session.is_complete());
        assert!(!session.skip());
    }

    #[test]
    fn retake_with_nothing_captured_is_ignored() {
        let mut session = CaptureSession::new();
        while session.skip() {}

        assert_eq!(session.record_capture(image("late")), CaptureOutcome::Ignored);
        assert!(session.photos().is_empty());
    }

    #[test]
    fn state_tracks_pose_match() {
        let session = CaptureSession::new();
        assert_eq!(session.state(false), SessionState::Detecting(0));
        assert_eq!(session.state(true), SessionState::ReadyToCapture(0));
        assert_eq!(session.current_target().unwrap().pose, Pose::Front);
    }

    #[test]
    fn payload_uses_submission_field_names() {
        let mut session = CaptureSession::new();
        session.record_capture(image("AAAA"));

        let json = session.to_payload_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{
                "dataURL": "data:image/jpeg;base64,AAAA",
                "angle": "front",
                "step": 1
            }])
        );
    }

    #[test]
    fn empty_session_cannot_be_submitted() {
        let mut session = CaptureSession::new();
        assert!(matches!(session.validate_submission(), Err(EnrollError::EmptySubmission)));

        session.skip();
        session.record_capture(image("one"));
        assert!(session.validate_submission().is_ok());
    }
}
