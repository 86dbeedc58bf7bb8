use crate::common::config::DetectorConfig;
use crate::common::{paths, Config, EnrollError, ModelSource, Result};
use crate::core::detection::{FaceBox, Landmarks, ModelDetection, Point};
use crate::core::detector::{FaceDetector, LandmarkModel};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const NMS_IOU_THRESHOLD: f32 = 0.45;
/// Extra margin around the face box before landmark regression.
const CROP_PADDING: f32 = 0.1;
const LANDMARK_COUNT: usize = 68;

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn cache_file_name(source_name: &str, url: &str) -> String {
    let file = url
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("model.onnx");
    let prefix: String = source_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}-{}", prefix, file)
}

/// Turn a configured location into a local file, downloading remote models
/// into `cache_dir` on first use.
pub fn resolve_location(location: &str, source_name: &str, cache_dir: &Path) -> Result<PathBuf> {
    if is_remote(location) {
        let cached = cache_dir.join(cache_file_name(source_name, location));
        if cached.exists() {
            tracing::debug!("Using cached model {}", cached.display());
            return Ok(cached);
        }
        download(location, &cached)?;
        return Ok(cached);
    }

    let mut path = PathBuf::from(location);
    if path.is_relative() {
        path = paths::system_models_dir().join(path);
    }
    if !path.exists() {
        return Err(EnrollError::ModelLoad(format!("Model not found at: {:?}", path)));
    }
    Ok(path)
}

fn download(url: &str, dest: &Path) -> Result<()> {
    tracing::info!("Downloading model from {}", url);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let response = ureq::get(url)
        .call()
        .map_err(|e| EnrollError::ModelLoad(format!("Failed to download {}: {}", url, e)))?;

    let partial = dest.with_extension("part");
    let mut file = fs::File::create(&partial)?;
    std::io::copy(&mut response.into_reader(), &mut file)?;
    fs::rename(&partial, dest)?;
    Ok(())
}

/// Loader for [`crate::core::FaceDetector::initialize`].
pub fn load_source(
    source: &ModelSource,
    config: &DetectorConfig,
    cache_dir: &Path,
) -> Result<Box<dyn LandmarkModel>> {
    let detector_path = resolve_location(&source.detector, &source.name, cache_dir)?;
    let landmark_path = resolve_location(&source.landmarks, &source.name, cache_dir)?;
    let model = OnnxLandmarkModel::load(&detector_path, &landmark_path, config)
        .map_err(|e| EnrollError::ModelLoad(format!("{}: {}", source.name, e)))?;
    Ok(Box::new(model))
}

/// Try every configured model source in order.
pub fn load_configured_detector(config: &Config) -> Result<FaceDetector> {
    let cache_dir = config.models.cache_dir();
    FaceDetector::initialize(&config.models.sources, |source| {
        load_source(source, &config.detector, &cache_dir)
    })
}

/// YOLO-style face detector followed by a 68-point landmark regressor.
pub struct OnnxLandmarkModel {
    detector: Session,
    landmarks: Session,
    _environment: Arc<Environment>,
    config: DetectorConfig,
}

impl OnnxLandmarkModel {
    pub fn load(
        detector_path: &Path,
        landmark_path: &Path,
        config: &DetectorConfig,
    ) -> Result<Self> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("face_enroll")
                .build()
                .map_err(|e| EnrollError::Model(format!("Failed to create environment: {}", e)))?
        );

        let opt_level = || match config.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        };

        let detector = SessionBuilder::new(&environment)?
            .with_optimization_level(opt_level())?
            .with_model_from_file(detector_path)?;
        let landmarks = SessionBuilder::new(&environment)?
            .with_optimization_level(opt_level())?
            .with_model_from_file(landmark_path)?;

        Ok(Self {
            detector,
            landmarks,
            _environment: environment,
            config: config.clone(),
        })
    }

    fn image_to_array(img: &RgbImage) -> Array4<f32> {
        let (width, height) = (img.width() as usize, img.height() as usize);
        let mut array = Array4::<f32>::zeros((1, 3, height, width));
        let norm_factor = 1.0 / 255.0;

        for (x, y, pixel) in img.enumerate_pixels() {
            for c in 0..3 {
                array[[0, c, y as usize, x as usize]] = pixel[c] as f32 * norm_factor;
            }
        }
        array
    }

    /// Run a single-input session; returns the first output and its shape.
    fn run_session(session: &Session, input: Array4<f32>) -> Result<(Vec<f32>, Vec<usize>)> {
        let cow_array = CowArray::from(input.into_dyn());
        let input_tensor = Value::from_array(session.allocator(), &cow_array)?;
        let outputs = session.run(vec![input_tensor])?;

        let first = outputs.first()
            .ok_or_else(|| EnrollError::Model("model produced no outputs".into()))?;
        let tensor = first.try_extract::<f32>()?;
        let view = tensor.view();
        Ok((view.iter().copied().collect(), view.shape().to_vec()))
    }

    fn detect_faces(&self, frame: &RgbImage) -> Result<Vec<FaceBox>> {
        let (orig_width, orig_height) = (frame.width() as f32, frame.height() as f32);
        let (input_w, input_h) = (self.config.input_width, self.config.input_height);

        let resized = if frame.dimensions() == (input_w, input_h) {
            frame.clone()
        } else {
            image::imageops::resize(frame, input_w, input_h, FilterType::Nearest)
        };

        let (output, shape) = Self::run_session(&self.detector, Self::image_to_array(&resized))?;
        let min_confidence = self.config.detection_confidence;
        let mut faces =
            parse_detections(&output, &shape, input_w as f32, input_h as f32, min_confidence);

        let scale_x = orig_width / input_w as f32;
        let scale_y = orig_height / input_h as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }
        Ok(faces)
    }

    fn regress_landmarks(&self, frame: &RgbImage, face: &FaceBox) -> Result<Option<Landmarks>> {
        let Some((cx, cy, side)) = padded_square(face, frame.width(), frame.height()) else {
            return Ok(None);
        };

        let side_px = self.config.landmark_input_size;
        let crop = DynamicImage::ImageRgb8(frame.clone())
            .crop_imm(cx, cy, side, side)
            .resize_exact(side_px, side_px, FilterType::Triangle)
            .to_rgb8();

        let (output, _) = Self::run_session(&self.landmarks, Self::image_to_array(&crop))?;
        if output.len() < LANDMARK_COUNT * 2 {
            return Err(EnrollError::Model(format!(
                "landmark model returned {} values, expected {}",
                output.len(),
                LANDMARK_COUNT * 2
            )));
        }

        let points: Vec<Point> = output[..LANDMARK_COUNT * 2]
            .chunks_exact(2)
            .map(|xy| Point::new(cx as f32 + xy[0] * side as f32, cy as f32 + xy[1] * side as f32))
            .collect();

        Ok(Landmarks::from_68_points(&points))
    }
}

impl LandmarkModel for OnnxLandmarkModel {
    fn name(&self) -> &str {
        "onnx-68"
    }

    fn detect(&mut self, frame: &RgbImage) -> Result<Option<ModelDetection>> {
        let faces = self.detect_faces(frame)?;
        let Some(face) = faces.into_iter().next() else {
            return Ok(None);
        };

        Ok(self.regress_landmarks(frame, &face)?
            .map(|landmarks| ModelDetection { face, landmarks }))
    }
}

/// Square crop around the face with padding, clamped to the frame.
fn padded_square(face: &FaceBox, width: u32, height: u32) -> Option<(u32, u32, u32)> {
    let side = face.width().max(face.height()) * (1.0 + 2.0 * CROP_PADDING);
    let center_x = (face.x1 + face.x2) / 2.0;
    let center_y = (face.y1 + face.y2) / 2.0;

    let x = (center_x - side / 2.0).max(0.0);
    let y = (center_y - side / 2.0).max(0.0);
    let side = side.min(width as f32 - x).min(height as f32 - y);

    if side < 8.0 {
        return None;
    }
    Some((x as u32, y as u32, side as u32))
}

/// Decode YOLO output `[1, N, 5+]` or transposed `[1, 5+, N]`, then NMS,
/// confidence filtering, and ordering by confidence.
fn parse_detections(
    output: &[f32],
    shape: &[usize],
    input_w: f32,
    input_h: f32,
    min_confidence: f32,
) -> Vec<FaceBox> {
    let (num_predictions, prediction_length, is_transposed) = match shape.len() {
        n if n >= 3 && shape[2] > shape[1] && shape[1] <= 10 => (shape[2], shape[1], true),
        n if n >= 3 => (shape[1], shape[2], false),
        2 => (shape[0], shape[1], false),
        _ => {
            tracing::warn!("Unexpected output shape: {:?}", shape);
            return Vec::new();
        }
    };

    if prediction_length < 4 || output.len() < num_predictions * prediction_length {
        tracing::warn!("Detector output too short for shape {:?}", shape);
        return Vec::new();
    }

    let at = |i: usize, field: usize| -> f32 {
        if is_transposed {
            output[field * num_predictions + i]
        } else {
            output[i * prediction_length + field]
        }
    };

    let mut faces = Vec::new();
    for i in 0..num_predictions {
        let confidence = if prediction_length > 4 { at(i, 4) } else { 0.0 };
        if confidence <= 0.001 {
            continue;
        }

        let (xc, yc, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
        // Normalized outputs are scaled up to the input size, per axis
        let (scale_x, scale_y) = if xc > 1.0 || yc > 1.0 || w > 1.0 || h > 1.0 {
            (1.0, 1.0)
        } else {
            (input_w, input_h)
        };
        let (xc, yc, w, h) = (xc * scale_x, yc * scale_y, w * scale_x, h * scale_y);

        let x1 = (xc - w / 2.0).max(0.0);
        let y1 = (yc - h / 2.0).max(0.0);
        let x2 = (xc + w / 2.0).min(input_w);
        let y2 = (yc + h / 2.0).min(input_h);

        if x2 - x1 > 10.0 && y2 - y1 > 10.0 {
            faces.push(FaceBox { x1, y1, x2, y2, confidence });
        }
    }

    let mut faces = apply_nms(faces, NMS_IOU_THRESHOLD);
    faces.retain(|face| face.confidence >= min_confidence);
    faces
}

fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| calculate_iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn calculate_iou(box1: &FaceBox, box2: &FaceBox) -> f32 {
    let x1 = box1.x1.max(box2.x1);
    let y1 = box1.y1.max(box2.y1);
    let x2 = box1.x2.min(box2.x2);
    let y2 = box1.y2.min(box2.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = box1.width() * box1.height() + box2.width() * box2.height() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, confidence }
    }

    #[test]
    fn nms_drops_overlapping_weaker_boxes() {
        let kept = apply_nms(
            vec![
                face(10.0, 10.0, 110.0, 110.0, 0.7),
                face(12.0, 12.0, 112.0, 112.0, 0.9),
                face(300.0, 300.0, 400.0, 400.0, 0.6),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.6);
    }

    #[test]
    fn parses_standard_and_transposed_layouts() {
        // pixel coordinates (xc, yc, w, h, conf), padded with empty predictions
        let mut rows = vec![[0.0_f32; 5]; 6];
        rows[0] = [100.0, 100.0, 60.0, 80.0, 0.8];
        rows[1] = [400.0, 300.0, 50.0, 50.0, 0.3];
        let standard: Vec<f32> = rows.iter().flatten().copied().collect();
        let faces = parse_detections(&standard, &[1, 6, 5], 640.0, 640.0, 0.5);
        assert_eq!(faces, vec![face(70.0, 60.0, 130.0, 140.0, 0.8)]);

        let transposed: Vec<f32> = (0..5).flat_map(|f| rows.iter().map(move |r| r[f])).collect();
        let faces = parse_detections(&transposed, &[1, 5, 6], 640.0, 640.0, 0.5);
        assert_eq!(faces, vec![face(70.0, 60.0, 130.0, 140.0, 0.8)]);
    }

    #[test]
    fn normalized_output_scales_each_axis_by_its_own_input_size() {
        let mut rows = vec![[0.0_f32; 5]; 6];
        rows[0] = [0.5, 0.25, 0.25, 0.25, 0.9];
        let output: Vec<f32> = rows.iter().flatten().copied().collect();

        let faces = parse_detections(&output, &[1, 6, 5], 640.0, 320.0, 0.5);
        assert_eq!(faces, vec![face(240.0, 40.0, 400.0, 120.0, 0.9)]);
    }

    #[test]
    fn bad_shape_yields_no_faces() {
        assert!(parse_detections(&[1.0; 5], &[5], 640.0, 640.0, 0.1).is_empty());
        assert!(parse_detections(&[1.0; 3], &[1, 2, 5], 640.0, 640.0, 0.1).is_empty());
    }

    #[test]
    fn crop_is_clamped_to_frame() {
        let (x, y, side) = padded_square(&face(0.0, 0.0, 100.0, 100.0, 1.0), 640, 480).unwrap();
        assert_eq!((x, y), (0, 0));
        assert!(side <= 120);
        assert!(padded_square(&face(0.0, 0.0, 2.0, 2.0, 1.0), 640, 480).is_none());
    }

    #[test]
    fn cached_remote_model_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://models.example.com/v2/face_landmarks_68.onnx";
        let cached = dir.path().join("cdn_mirror-face_landmarks_68.onnx");
        fs::write(&cached, b"onnx").unwrap();

        assert_eq!(resolve_location(url, "cdn mirror", dir.path()).unwrap(), cached);
    }

    #[test]
    fn missing_local_model_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.onnx");
        let err = resolve_location(missing.to_str().unwrap(), "local", dir.path()).unwrap_err();
        assert!(matches!(err, EnrollError::ModelLoad(_)));
    }
}
