//! Skin-tone heuristic used when no landmark model could be loaded.
//!
//! This is deliberately crude: it only answers "is there probably a face in
//! front of the camera" so enrollment keeps working without the model.

use crate::core::detection::FaceBox;
use image::{imageops::FilterType, Rgb, RgbImage};

/// Frames are sampled at this fraction of their size.
const DOWNSCALE: u32 = 4;
/// Minimum fraction of skin pixels for a face to be reported.
pub const SKIN_FRACTION_THRESHOLD: f32 = 0.02;
const CONFIDENCE_SCALE: f32 = 10.0;

pub fn is_skin(pixel: &Rgb<u8>) -> bool {
    let [r, g, b] = pixel.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);

    r > 95
        && g > 40
        && b > 20
        && max - min > 15
        && r.abs_diff(g) > 15
        && r > g
        && r > b
}

pub fn skin_fraction(frame: &RgbImage) -> f32 {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }

    let sample = image::imageops::resize(
        frame,
        (width / DOWNSCALE).max(1),
        (height / DOWNSCALE).max(1),
        FilterType::Nearest,
    );

    let total = (sample.width() * sample.height()) as usize;
    let skin = sample.pixels().filter(|p| is_skin(p)).count();
    skin as f32 / total as f32
}

/// A centered box over the middle half of the frame when enough skin shows.
pub fn detect_basic(frame: &RgbImage) -> Option<FaceBox> {
    let fraction = skin_fraction(frame);
    if fraction <= SKIN_FRACTION_THRESHOLD {
        return None;
    }

    let (width, height) = (frame.width() as f32, frame.height() as f32);
    Some(FaceBox {
        x1: width * 0.25,
        y1: height * 0.25,
        x2: width * 0.75,
        y2: height * 0.75,
        confidence: (fraction * CONFIDENCE_SCALE).min(1.0),
    })
}
