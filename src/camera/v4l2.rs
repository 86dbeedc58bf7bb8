use crate::camera::{EncodedStill, VideoDevice};
use crate::common::{EnrollError, Result};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, RgbImage};
use std::fs;

/// A camera found under `/dev/video*`.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub features: Vec<String>,
    pub has_color: bool,
}

fn video_indices() -> Result<Vec<u32>> {
    let mut indices = Vec::new();
    for entry in fs::read_dir("/dev")? {
        let entry = entry?;
        let path = entry.path();
        let filename = path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");

        if let Some(index) = filename.strip_prefix("video").and_then(|s| s.parse::<u32>().ok()) {
            indices.push(index);
        }
    }
    indices.sort_unstable();
    Ok(indices)
}

const STREAM_BUFFERS: u32 = 4;

fn fourcc_name(fourcc: &FourCC) -> String {
    fourcc.str().unwrap_or("UNKNOWN").to_string()
}

/// V4L2 capture device. The mmap stream stays up from `open` to `close`.
pub struct V4lDevice {
    index: u32,
    device: Option<Device>,
    stream: Option<Stream<'static>>,
    format: Option<v4l::Format>,
}

impl V4lDevice {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            device: None,
            stream: None,
            format: None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// `999` selects the first color capture device.
    pub fn from_config_index(device_index: u32) -> Result<Self> {
        let index = if device_index == 999 {
            Self::detect_color_camera()?
        } else {
            device_index
        };
        Ok(Self::new(index))
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// List all available cameras with their capabilities.
    pub fn list_all_cameras() -> Result<Vec<CameraInfo>> {
        let mut cameras = Vec::new();

        for index in video_indices()? {
            let Ok(device) = Device::new(index as usize) else { continue };
            let Ok(caps) = device.query_caps() else { continue };

            let mut features = Vec::new();
            let mut has_color = false;

            if caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                features.push("VIDEO_CAPTURE".to_string());
            } else if caps.capabilities.contains(v4l::capability::Flags::META_CAPTURE) {
                features.push("METADATA_CAPTURE".to_string());
            }

            for fmt in device.enum_formats().unwrap_or_default() {
                let name = fourcc_name(&fmt.fourcc);
                match name.as_str() {
                    "MJPG" | "YUYV" => {
                        features.push(format!("Color ({})", name));
                        has_color = true;
                    }
                    "GREY" | "Y8  " | "Y16 " => {
                        features.push(format!("Grayscale ({})", name.trim()))
                    }
                    _ => {}
                }
            }

            cameras.push(CameraInfo { index, name: caps.card.clone(), features, has_color });
        }

        Ok(cameras)
    }

    /// Pick the first device that can stream color video, else video0.
    pub fn detect_color_camera() -> Result<u32> {
        let cameras = Self::list_all_cameras()?;
        let selected = cameras.iter()
            .find(|c| c.has_color && c.features.iter().any(|f| f == "VIDEO_CAPTURE"))
            .map(|c| c.index);

        match selected {
            Some(index) => {
                tracing::info!("Selected camera: /dev/video{}", index);
                Ok(index)
            }
            None => {
                tracing::warn!("No color camera detected, falling back to device 0");
                Ok(0)
            }
        }
    }

    fn grab_raw(&mut self) -> Result<(Vec<u8>, v4l::Format)> {
        let (Some(stream), Some(format)) = (self.stream.as_mut(), self.format.as_ref()) else {
            return Err(EnrollError::Camera("Camera stream is not open".into()));
        };

        let (buf, meta) = stream
            .next()
            .map_err(|e| EnrollError::Camera(format!("Failed to capture: {}", e)))?;

        let used = (meta.bytesused as usize).min(buf.len());
        let used = if used == 0 { buf.len() } else { used };
        Ok((buf[..used].to_vec(), format.clone()))
    }

    fn decode(data: &[u8], format: &v4l::Format) -> Result<RgbImage> {
        match fourcc_name(&format.fourcc).as_str() {
            "GREY" => {
                let expected = (format.width * format.height) as usize;
                if data.len() < expected {
                    return Err(EnrollError::Camera("Short grayscale frame".into()));
                }
                let pixels = data[..expected].to_vec();
                let gray = ImageBuffer::<Luma<u8>, _>::from_raw(format.width, format.height, pixels)
                    .ok_or_else(|| {
                        EnrollError::Camera("Failed to create grayscale image buffer".into())
                    })?;
                Ok(DynamicImage::ImageLuma8(gray).to_rgb8())
            }
            "MJPG" => Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8()),
            "YUYV" => yuyv_to_rgb(data, format.width, format.height),
            other => Err(EnrollError::Camera(format!("Unsupported format: {}", other))),
        }
    }
}

fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        return Err(EnrollError::Camera("Short YUYV frame".into()));
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let (y0, y1) = (chunk[0] as f32, chunk[2] as f32);
        let (u, v) = (chunk[1] as f32 - 128.0, chunk[3] as f32 - 128.0);
        for y in [y0, y1] {
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| EnrollError::Camera("Failed to create RGB image buffer".into()))
}

impl VideoDevice for V4lDevice {
    fn open(&mut self, width: u32, height: u32) -> Result<(u32, u32)> {
        tracing::info!("Opening camera device {}...", self.index);

        // io::Error kinds are preserved so permission/not-found can be told apart.
        let device = Device::new(self.index as usize)?;

        let caps = device.query_caps()?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            tracing::warn!("Device {} may not support standard video capture", self.index);
        }

        let mut fmt = device.format()?;
        fmt.width = width;
        fmt.height = height;

        // Keep GREY for IR sensors, otherwise ask for MJPG
        if fourcc_name(&fmt.fourcc) != "GREY" {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set exact format: {}. Using device defaults.", e);
        }

        let final_fmt = device.format()?;
        tracing::info!(
            "Actual format: {}x{} {}",
            final_fmt.width, final_fmt.height, fourcc_name(&final_fmt.fourcc)
        );

        // io::Error passes through so a busy device is still classified
        let stream = Stream::with_buffers(&device, Type::VideoCapture, STREAM_BUFFERS)?;

        let negotiated = (final_fmt.width, final_fmt.height);
        self.format = Some(final_fmt);
        self.stream = Some(stream);
        self.device = Some(device);
        Ok(negotiated)
    }

    fn read_frame(&mut self) -> Result<RgbImage> {
        let (data, format) = self.grab_raw()?;
        Self::decode(&data, &format)
    }

    fn grab_still(&mut self) -> Result<Option<EncodedStill>> {
        let is_mjpeg = self.format.as_ref()
            .map(|f| fourcc_name(&f.fourcc) == "MJPG")
            .unwrap_or(false);
        if !is_mjpeg {
            return Ok(None);
        }

        let (data, _) = self.grab_raw()?;
        Ok(Some(EncodedStill { mime: "image/jpeg", bytes: data }))
    }

    fn close(&mut self) {
        // stream first, it unmaps buffers on the device handle
        self.stream = None;
        self.device = None;
        self.format = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_gray_decodes_to_gray() {
        // Y=128, U=V=128 is mid gray
        let data = vec![128u8; 4 * 2 * 2];
        let rgb = yuyv_to_rgb(&data, 4, 2).unwrap();
        assert_eq!(rgb.dimensions(), (4, 2));
        assert!(rgb.pixels().all(|p| p.0 == [128, 128, 128]));
    }

    #[test]
    fn short_yuyv_frame_is_rejected() {
        assert!(yuyv_to_rgb(&[0u8; 6], 4, 2).is_err());
    }

    #[test]
    fn read_before_open_is_an_error() {
        let mut device = V4lDevice::new(42);
        assert!(!device.is_streaming());
        assert!(device.read_frame().is_err());
        assert!(device.grab_still().unwrap().is_none());
    }
}
