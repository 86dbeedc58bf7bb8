use crate::common::{EnrollError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use std::io::Cursor;

/// Data URLs at or below this length are treated as blank output.
///
/// A sandboxed or stalled device can hand back an empty surface that still
/// "encodes" successfully; the result is only a header and a few bytes.
pub const MIN_ENCODED_LEN: usize = 100;

/// An encoded still image carried as a `data:` URL.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub data_url: String,
    pub mime: String,
}

impl CapturedImage {
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self {
            data_url: format!("data:{};base64,{}", mime, STANDARD.encode(bytes)),
            mime: mime.to_string(),
        }
    }

    /// Rebuild from a stored `data:<mime>;base64,...` string.
    pub fn from_data_url(data_url: &str) -> Option<Self> {
        let (mime, _) = data_url.strip_prefix("data:")?.split_once(';')?;
        Some(Self {
            data_url: data_url.to_string(),
            mime: mime.to_string(),
        })
    }

    pub fn is_substantial(&self) -> bool {
        self.data_url.len() > MIN_ENCODED_LEN
    }

    /// Raw image bytes behind the data URL.
    pub fn decode_bytes(&self) -> Result<Vec<u8>> {
        let payload = self
            .data_url
            .split_once(',')
            .map(|(_, payload)| payload)
            .ok_or_else(|| EnrollError::CaptureExport("malformed data URL".into()))?;
        STANDARD
            .decode(payload)
            .map_err(|e| EnrollError::CaptureExport(format!("invalid base64 payload: {}", e)))
    }

    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/bmp" => "bmp",
            _ => "bin",
        }
    }
}

/// One way of turning a raw frame into an encoded image.
pub trait FrameEncoder: Send {
    fn mime(&self) -> &'static str;
    fn encode(&self, frame: &RgbImage) -> Result<Vec<u8>>;
}

fn write_dynamic(frame: &RgbImage, format: ImageOutputFormat) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(frame.clone()).write_to(&mut cursor, format)?;
    Ok(cursor.into_inner())
}

pub struct JpegExport {
    pub quality: u8,
}

impl FrameEncoder for JpegExport {
    fn mime(&self) -> &'static str {
        "image/jpeg"
    }

    fn encode(&self, frame: &RgbImage) -> Result<Vec<u8>> {
        write_dynamic(frame, ImageOutputFormat::Jpeg(self.quality))
    }
}

pub struct PngExport;

impl FrameEncoder for PngExport {
    fn mime(&self) -> &'static str {
        "image/png"
    }

    fn encode(&self, frame: &RgbImage) -> Result<Vec<u8>> {
        write_dynamic(frame, ImageOutputFormat::Png)
    }
}

/// Last resort: uncompressed output that needs no codec tuning.
pub struct DefaultExport;

impl FrameEncoder for DefaultExport {
    fn mime(&self) -> &'static str {
        "image/bmp"
    }

    fn encode(&self, frame: &RgbImage) -> Result<Vec<u8>> {
        write_dynamic(frame, ImageOutputFormat::Bmp)
    }
}

pub fn default_pipeline() -> Vec<Box<dyn FrameEncoder>> {
    vec![
        Box::new(JpegExport { quality: 90 }),
        Box::new(PngExport),
        Box::new(DefaultExport),
    ]
}

/// Run the encoders in order and keep the first non-trivial result.
pub fn export_frame(frame: &RgbImage, encoders: &[Box<dyn FrameEncoder>]) -> Result<CapturedImage> {
    let mut failures = Vec::new();

    for encoder in encoders {
        match encoder.encode(frame) {
            Ok(bytes) => {
                let image = CapturedImage::from_bytes(encoder.mime(), &bytes);
                if image.is_substantial() {
                    tracing::debug!(
                        mime = encoder.mime(),
                        bytes = bytes.len(),
                        "Frame exported"
                    );
                    return Ok(image);
                }
                failures.push(format!("{}: empty output", encoder.mime()));
            }
            Err(e) => failures.push(format!("{}: {}", encoder.mime(), e)),
        }
    }

    Err(EnrollError::CaptureExport(format!(
        "every encoder produced an empty image ({})",
        failures.join("; ")
    )))
}
