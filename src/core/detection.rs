use crate::core::orientation::{Lighting, OrientationEstimate};

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Facial landmark point groups in frame pixel coordinates.
///
/// `nose` follows the 68-point layout: the first point is the top of the
/// bridge and index 3 is the tip.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    pub left_eye: Vec<Point>,
    pub right_eye: Vec<Point>,
    pub nose: Vec<Point>,
    pub mouth: Vec<Point>,
}

impl Landmarks {
    /// Split a full 68-point set into the groups used for pose estimation.
    pub fn from_68_points(points: &[Point]) -> Option<Self> {
        if points.len() < 68 {
            return None;
        }
        Some(Self {
            left_eye: points[36..42].to_vec(),
            right_eye: points[42..48].to_vec(),
            nose: points[27..36].to_vec(),
            mouth: points[48..68].to_vec(),
        })
    }
}

pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f32;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}

/// Output of the model, before orientation is derived.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDetection {
    pub face: FaceBox,
    pub landmarks: Landmarks,
}

/// Everything the orchestrator knows about the face in the latest frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub face: FaceBox,
    pub landmarks: Option<Landmarks>,
    pub orientation: OrientationEstimate,
    pub lighting: Lighting,
}

impl DetectionResult {
    pub fn has_landmarks(&self) -> bool {
        self.landmarks.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_68_point_layout() {
        let points: Vec<Point> = (0..68).map(|i| Point::new(i as f32, 0.0)).collect();
        let landmarks = Landmarks::from_68_points(&points).unwrap();

        assert_eq!(landmarks.left_eye.len(), 6);
        assert_eq!(landmarks.right_eye[0].x, 42.0);
        assert_eq!(landmarks.nose[0].x, 27.0);
        assert_eq!(landmarks.nose[3].x, 30.0);
        assert_eq!(landmarks.mouth.len(), 20);
        assert!(Landmarks::from_68_points(&points[..10]).is_none());
    }

    #[test]
    fn centroid_of_square() {
        let pts = [
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 2.0),
            Point::new(0.0, 2.0),
        ];
        assert_eq!(centroid(&pts), Some(Point::new(1.0, 1.0)));
        assert_eq!(centroid(&[]), None);
    }
}
