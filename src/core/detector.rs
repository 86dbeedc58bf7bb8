use crate::common::{EnrollError, ModelSource, Result};
use crate::core::detection::{DetectionResult, ModelDetection};
use crate::core::orientation::{classify_lighting, classify_orientation, OrientationEstimate};
use crate::core::skin;
use image::RgbImage;

/// A loaded landmark model: finds the most confident face and its landmarks.
pub trait LandmarkModel: Send {
    fn name(&self) -> &str;

    /// `Ok(None)` when no face is in the frame.
    fn detect(&mut self, frame: &RgbImage) -> Result<Option<ModelDetection>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorMode {
    /// Landmark model loaded; orientation is available.
    Landmark,
    /// Skin-tone heuristic only; no landmarks, orientation is always unknown.
    Basic,
}

pub struct FaceDetector {
    model: Option<Box<dyn LandmarkModel>>,
}

impl FaceDetector {
    pub fn basic() -> Self {
        Self { model: None }
    }

    pub fn with_model(model: Box<dyn LandmarkModel>) -> Self {
        Self { model: Some(model) }
    }

    /// Load the first model source that works, in the given order.
    ///
    /// Fails with `ModelLoad` only when every source failed; callers are
    /// expected to fall back to [`FaceDetector::basic`].
    pub fn initialize<F>(sources: &[ModelSource], mut load: F) -> Result<Self>
    where
        F: FnMut(&ModelSource) -> Result<Box<dyn LandmarkModel>>,
    {
        let mut failures = Vec::new();

        for source in sources {
            match load(source) {
                Ok(model) => {
                    tracing::info!(
                        source = %source.name,
                        model = model.name(),
                        "Landmark model loaded"
                    );
                    return Ok(Self::with_model(model));
                }
                Err(e) => {
                    tracing::warn!(source = %source.name, "Model source failed: {}", e);
                    failures.push(format!("{}: {}", source.name, e));
                }
            }
        }

        if failures.is_empty() {
            return Err(EnrollError::ModelLoad("no model sources configured".into()));
        }
        Err(EnrollError::ModelLoad(failures.join("; ")))
    }

    pub fn mode(&self) -> DetectorMode {
        if self.model.is_some() {
            DetectorMode::Landmark
        } else {
            DetectorMode::Basic
        }
    }

    /// Run the landmark model. Errors are left for the caller to handle.
    pub fn detect_with_model(&mut self, frame: &RgbImage) -> Result<Option<DetectionResult>> {
        let model = self.model.as_mut()
            .ok_or_else(|| EnrollError::Model("no landmark model loaded".into()))?;

        Ok(model.detect(frame)?.map(|ModelDetection { face, landmarks }| {
            let orientation = classify_orientation(Some(&landmarks));
            let lighting = classify_lighting(frame, &face);
            DetectionResult {
                face,
                landmarks: Some(landmarks),
                orientation,
                lighting,
            }
        }))
    }

    pub fn detect_basic(&self, frame: &RgbImage) -> Option<DetectionResult> {
        skin::detect_basic(frame).map(|face| {
            let lighting = classify_lighting(frame, &face);
            DetectionResult {
                face,
                landmarks: None,
                orientation: OrientationEstimate::unknown(),
                lighting,
            }
        })
    }

    pub fn detect(&mut self, frame: &RgbImage) -> Result<Option<DetectionResult>> {
        match self.mode() {
            DetectorMode::Landmark => self.detect_with_model(frame),
            DetectorMode::Basic => Ok(self.detect_basic(frame)),
        }
    }
}
