//! Head orientation from landmark geometry.
//!
//! The ratios and thresholds here define what "correct pose" means for the
//! enrollment guidance, so they are fixed rather than configurable.

use crate::core::detection::{centroid, FaceBox, Landmarks, Point};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nose offset beyond this fraction of the eye distance is a turned head.
pub const HORIZONTAL_THRESHOLD: f32 = 0.15;
/// Nose above this fraction of the eye-to-mouth span reads as looking up.
pub const UP_THRESHOLD: f32 = 0.4;
/// Nose below this fraction of the eye-to-mouth span reads as looking down.
pub const DOWN_THRESHOLD: f32 = 0.6;
const MAX_TURN_CONFIDENCE: f32 = 0.9;
const FRONT_CONFIDENCE: f32 = 0.8;

/// One of the head poses an enrollment collects a photo for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pose {
    Front,
    Left,
    Right,
    Up,
    Down,
}

impl Pose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pose::Front => "front",
            Pose::Left => "left",
            Pose::Right => "right",
            Pose::Up => "up",
            Pose::Down => "down",
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Front,
    Left,
    Right,
    Up,
    Down,
    Unknown,
}

impl Orientation {
    pub fn pose(&self) -> Option<Pose> {
        match self {
            Orientation::Front => Some(Pose::Front),
            Orientation::Left => Some(Pose::Left),
            Orientation::Right => Some(Pose::Right),
            Orientation::Up => Some(Pose::Up),
            Orientation::Down => Some(Pose::Down),
            Orientation::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.pose().map(|p| p.as_str()).unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationEstimate {
    pub orientation: Orientation,
    pub confidence: f32,
}

impl OrientationEstimate {
    pub fn unknown() -> Self {
        Self { orientation: Orientation::Unknown, confidence: 0.0 }
    }
}

/// Intermediate geometry, kept for debug overlays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationGeometry {
    pub eye_midpoint: Point,
    pub nose_tip: Point,
    pub nose_bridge: Point,
    pub mouth_center: Point,
    pub horizontal_ratio: f32,
    pub vertical_ratio: f32,
}

pub fn measure(landmarks: &Landmarks) -> Option<OrientationGeometry> {
    let left_eye = centroid(&landmarks.left_eye)?;
    let right_eye = centroid(&landmarks.right_eye)?;
    let mouth_center = centroid(&landmarks.mouth)?;
    let nose_bridge = *landmarks.nose.first()?;
    let nose_tip = *landmarks.nose.get(3)?;

    let eye_midpoint = Point::new(
        (left_eye.x + right_eye.x) / 2.0,
        (left_eye.y + right_eye.y) / 2.0,
    );
    let eye_distance = (right_eye.x - left_eye.x).abs();
    let eye_to_mouth = mouth_center.y - eye_midpoint.y;

    if eye_distance <= f32::EPSILON || eye_to_mouth.abs() <= f32::EPSILON {
        return None;
    }

    Some(OrientationGeometry {
        eye_midpoint,
        nose_tip,
        nose_bridge,
        mouth_center,
        horizontal_ratio: (nose_tip.x - eye_midpoint.x) / eye_distance,
        vertical_ratio: (nose_tip.y - eye_midpoint.y) / eye_to_mouth,
    })
}

/// Classify ratios in fixed order: turn, then up, then down, else front.
pub fn classify_ratios(horizontal_ratio: f32, vertical_ratio: f32) -> OrientationEstimate {
    if horizontal_ratio.abs() > HORIZONTAL_THRESHOLD {
        let orientation = if horizontal_ratio < 0.0 {
            Orientation::Left
        } else {
            Orientation::Right
        };
        return OrientationEstimate {
            orientation,
            confidence: (horizontal_ratio.abs() * 3.0).min(MAX_TURN_CONFIDENCE),
        };
    }

    if vertical_ratio < UP_THRESHOLD {
        return OrientationEstimate {
            orientation: Orientation::Up,
            confidence: ((UP_THRESHOLD - vertical_ratio) * 2.0).min(MAX_TURN_CONFIDENCE),
        };
    }

    if vertical_ratio > DOWN_THRESHOLD {
        return OrientationEstimate {
            orientation: Orientation::Down,
            confidence: ((vertical_ratio - DOWN_THRESHOLD) * 2.0).min(MAX_TURN_CONFIDENCE),
        };
    }

    OrientationEstimate { orientation: Orientation::Front, confidence: FRONT_CONFIDENCE }
}

/// `Unknown` whenever landmarks are missing (basic detector) or degenerate.
pub fn classify_orientation(landmarks: Option<&Landmarks>) -> OrientationEstimate {
    landmarks
        .and_then(measure)
        .map(|g| classify_ratios(g.horizontal_ratio, g.vertical_ratio))
        .unwrap_or_else(OrientationEstimate::unknown)
}

/// Does the detected orientation satisfy the target pose?
///
/// Up and down are hard to tell apart from a neutral face, so a front
/// reading is accepted for both.
pub fn pose_matches(target: Pose, detected: Orientation) -> bool {
    match detected.pose() {
        Some(pose) if pose == target => true,
        Some(Pose::Front) => matches!(target, Pose::Up | Pose::Down),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lighting {
    Dark,
    Adequate,
    Bright,
}

/// Placeholder: no calibrated lighting analysis exists yet.
pub fn classify_lighting(_frame: &RgbImage, _face: &FaceBox) -> Lighting {
    Lighting::Adequate
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Eyes centered at (100, 100) and (200, 100), mouth centered at y = 200.
    fn fixture(horizontal: f32, vertical: f32) -> Landmarks {
        let around = |cx: f32, cy: f32| {
            vec![
                Point::new(cx - 10.0, cy),
                Point::new(cx + 10.0, cy),
                Point::new(cx, cy - 5.0),
                Point::new(cx, cy + 5.0),
            ]
        };
        let tip = Point::new(150.0 + horizontal * 100.0, 100.0 + vertical * 100.0);
        let mut nose = vec![Point::new(150.0, 105.0); 9];
        nose[3] = tip;

        Landmarks {
            left_eye: around(100.0, 100.0),
            right_eye: around(200.0, 100.0),
            nose,
            mouth: around(150.0, 200.0),
        }
    }

    fn classify(h: f32, v: f32) -> OrientationEstimate {
        classify_orientation(Some(&fixture(h, v)))
    }

    #[test]
    fn geometry_reproduces_fixture_ratios() {
        let g = measure(&fixture(0.1, 0.45)).unwrap();
        assert!((g.horizontal_ratio - 0.1).abs() < 1e-5);
        assert!((g.vertical_ratio - 0.45).abs() < 1e-5);
        assert_eq!(g.nose_bridge, Point::new(150.0, 105.0));
    }

    #[test]
    fn turned_head_is_left_or_right_by_sign() {
        for h in [0.16_f32, 0.2, 0.25, 0.4, 0.8] {
            let right = classify(h, 0.5);
            assert_eq!(right.orientation, Orientation::Right, "h = {}", h);
            assert!((right.confidence - (h * 3.0).min(0.9)).abs() < 1e-4);

            let left = classify(-h, 0.5);
            assert_eq!(left.orientation, Orientation::Left, "h = {}", -h);
            assert!((left.confidence - (h * 3.0).min(0.9)).abs() < 1e-4);
        }
    }

    #[test]
    fn horizontal_check_takes_priority_over_vertical() {
        assert_eq!(classify(0.3, 0.1).orientation, Orientation::Right);
        assert_eq!(classify(-0.3, 0.9).orientation, Orientation::Left);
    }

    #[test]
    fn high_nose_is_up() {
        for v in [0.0_f32, 0.1, 0.3, 0.39] {
            let est = classify(0.05, v);
            assert_eq!(est.orientation, Orientation::Up, "v = {}", v);
            assert!((est.confidence - ((0.4 - v) * 2.0).min(0.9)).abs() < 1e-4);
        }
    }

    #[test]
    fn low_nose_is_down() {
        for v in [0.61_f32, 0.7, 0.9, 1.2] {
            let est = classify(-0.1, v);
            assert_eq!(est.orientation, Orientation::Down, "v = {}", v);
            assert!((est.confidence - ((v - 0.6) * 2.0).min(0.9)).abs() < 1e-4);
        }
    }

    #[test]
    fn neutral_band_is_front_with_fixed_confidence() {
        for (h, v) in [(0.0_f32, 0.5_f32), (0.1, 0.45), (-0.14, 0.55), (0.05, 0.41)] {
            let est = classify(h, v);
            assert_eq!(est.orientation, Orientation::Front);
            assert_eq!(est.confidence, 0.8);
        }
    }

    #[test]
    fn missing_landmarks_are_unknown() {
        let est = classify_orientation(None);
        assert_eq!(est.orientation, Orientation::Unknown);
        assert_eq!(est.confidence, 0.0);
    }

    #[test]
    fn collapsed_eyes_are_unknown() {
        let mut landmarks = fixture(0.0, 0.5);
        landmarks.right_eye = landmarks.left_eye.clone();
        assert_eq!(classify_orientation(Some(&landmarks)).orientation, Orientation::Unknown);
    }

    #[test]
    fn match_rule_accepts_front_for_vertical_targets_only() {
        assert!(pose_matches(Pose::Up, Orientation::Front));
        assert!(pose_matches(Pose::Down, Orientation::Front));
        assert!(!pose_matches(Pose::Left, Orientation::Front));
        assert!(!pose_matches(Pose::Right, Orientation::Front));

        assert!(pose_matches(Pose::Front, Orientation::Front));
        let others = [
            Orientation::Left,
            Orientation::Right,
            Orientation::Up,
            Orientation::Down,
            Orientation::Unknown,
        ];
        for other in others {
            assert!(!pose_matches(Pose::Front, other));
        }

        assert!(pose_matches(Pose::Left, Orientation::Left));
        assert!(pose_matches(Pose::Up, Orientation::Up));
        assert!(!pose_matches(Pose::Up, Orientation::Down));
        assert!(!pose_matches(Pose::Down, Orientation::Unknown));
    }

    #[test]
    fn lighting_is_always_adequate() {
        let frame = RgbImage::new(4, 4);
        let face = FaceBox { x1: 0.0, y1: 0.0, x2: 4.0, y2: 4.0, confidence: 1.0 };
        assert_eq!(classify_lighting(&frame, &face), Lighting::Adequate);
    }

    #[test]
    fn pose_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Pose::Down).unwrap(), "\"down\"");
    }
}
