pub mod encode;
pub mod v4l2;

pub use encode::{CapturedImage, FrameEncoder, MIN_ENCODED_LEN};
pub use v4l2::V4lDevice;

use crate::common::config::CameraConfig;
use crate::common::{DeviceAccessKind, EnrollError, Result};
use image::RgbImage;
use std::time::{Duration, Instant};

const FRAME_WAIT_STEP: Duration = Duration::from_millis(10);

/// Image bytes produced directly by the device, already encoded.
#[derive(Debug, Clone)]
pub struct EncodedStill {
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// A source of live video frames.
pub trait VideoDevice: Send {
    /// Open the stream, asking for `width`x`height`. Returns the negotiated size.
    fn open(&mut self, width: u32, height: u32) -> Result<(u32, u32)>;

    /// Read and decode the current frame.
    fn read_frame(&mut self) -> Result<RgbImage>;

    /// Platform still-frame grab. `Ok(None)` when the device has none.
    fn grab_still(&mut self) -> Result<Option<EncodedStill>>;

    /// Stop the stream. Must tolerate being called when not open.
    fn close(&mut self);
}

/// Owns the video device for one enrollment and produces still captures.
pub struct CameraController<D: VideoDevice> {
    device: D,
    settings: CameraConfig,
    stream_open: bool,
    frame_decoded: bool,
    dimensions: (u32, u32),
    encoders: Vec<Box<dyn FrameEncoder>>,
}

impl<D: VideoDevice> CameraController<D> {
    pub fn new(device: D, settings: CameraConfig) -> Self {
        Self::with_encoders(device, settings, encode::default_pipeline())
    }

    pub fn with_encoders(
        device: D,
        settings: CameraConfig,
        encoders: Vec<Box<dyn FrameEncoder>>,
    ) -> Self {
        Self {
            device,
            settings,
            stream_open: false,
            frame_decoded: false,
            dimensions: (0, 0),
            encoders,
        }
    }

    /// Open the device and block until the first decoded frame arrives.
    pub fn initialize(&mut self) -> Result<()> {
        let negotiated = match self.device.open(self.settings.width, self.settings.height) {
            Ok(size) => size,
            Err(err) => return Err(self.access_failure(err)),
        };
        self.stream_open = true;

        if negotiated != (self.settings.width, self.settings.height) {
            tracing::warn!(
                "Camera negotiated {}x{} instead of requested {}x{}",
                negotiated.0, negotiated.1, self.settings.width, self.settings.height
            );
        }

        for i in 0..self.settings.warmup_frames {
            if let Err(e) = self.device.read_frame() {
                tracing::debug!("Warmup frame {} failed: {}", i, e);
            }
            std::thread::sleep(Duration::from_millis(self.settings.warmup_delay_ms));
        }

        let deadline = Instant::now() + Duration::from_millis(self.settings.ready_timeout_ms);
        loop {
            match self.device.read_frame() {
                Ok(frame) if frame.width() > 0 && frame.height() > 0 => {
                    self.frame_decoded = true;
                    self.dimensions = frame.dimensions();
                    break;
                }
                Ok(_) => tracing::debug!("Camera returned an empty frame, waiting"),
                Err(e) => tracing::debug!("Waiting for first frame: {}", e),
            }

            if Instant::now() >= deadline {
                let err = EnrollError::Camera(format!(
                    "no frame decoded within {} ms",
                    self.settings.ready_timeout_ms
                ));
                return Err(self.access_failure(err));
            }
            std::thread::sleep(FRAME_WAIT_STEP);
        }

        tracing::info!(
            "Camera ready at {}x{}",
            self.dimensions.0, self.dimensions.1
        );
        Ok(())
    }

    fn access_failure(&mut self, err: EnrollError) -> EnrollError {
        let kind = match &err {
            EnrollError::Io(io) => DeviceAccessKind::from_io(io),
            EnrollError::DeviceAccess { kind, .. } => *kind,
            _ => DeviceAccessKind::Generic,
        };

        tracing::error!(error = %err, ?kind, "Camera initialization failed");
        self.cleanup();

        // The user-facing text travels with the error; the controller is
        // usually dropped right after this.
        EnrollError::DeviceAccess {
            kind,
            message: format!("{} ({})", kind.user_message(), err),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.stream_open && self.frame_decoded && self.dimensions.0 > 0 && self.dimensions.1 > 0
    }


    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    /// The live frame, for detection.
    pub fn current_frame(&mut self) -> Result<RgbImage> {
        if !self.stream_open || !self.frame_decoded {
            return Err(EnrollError::CaptureNotReady);
        }
        let frame = self.device.read_frame()?;
        self.dimensions = frame.dimensions();
        Ok(frame)
    }

    /// Capture one still: native grab first, then the encoder pipeline.
    pub fn capture_photo(&mut self) -> Result<CapturedImage> {
        if !self.is_ready() {
            return Err(EnrollError::CaptureNotReady);
        }

        match self.device.grab_still() {
            Ok(Some(still)) => {
                let image = CapturedImage::from_bytes(still.mime, &still.bytes);
                if image.is_substantial() {
                    tracing::debug!(
                        mime = still.mime,
                        bytes = still.bytes.len(),
                        "Captured native still"
                    );
                    return Ok(image);
                }
                tracing::debug!("Native still was empty, falling back to frame export");
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("Native still grab failed, exporting a frame: {}", e),
        }

        let frame = self.device.read_frame()?;
        if frame.width() == 0 || frame.height() == 0 {
            return Err(EnrollError::CaptureNotReady);
        }
        encode::export_frame(&frame, &self.encoders)
    }

    /// Release the device. Safe to call repeatedly or before `initialize`.
    pub fn cleanup(&mut self) {
        if self.stream_open {
            self.device.close();
            tracing::debug!("Camera stream released");
        }
        self.stream_open = false;
        self.frame_decoded = false;
    }
}

impl<D: VideoDevice> Drop for CameraController<D> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io;

    #[derive(Default)]
    struct FakeDevice {
        open_error: Option<io::ErrorKind>,
        blank_frames: bool,
        still: Option<Vec<u8>>,
        opened: bool,
        open_calls: usize,
        read_calls: usize,
        close_calls: usize,
    }

    impl VideoDevice for FakeDevice {
        fn open(&mut self, width: u32, height: u32) -> Result<(u32, u32)> {
            if let Some(kind) = self.open_error {
                return Err(io::Error::new(kind, "fake open failure").into());
            }
            self.opened = true;
            self.open_calls += 1;
            Ok((width, height))
        }

        fn read_frame(&mut self) -> Result<RgbImage> {
            if !self.opened {
                return Err(EnrollError::Camera("not open".into()));
            }
            self.read_calls += 1;
            if self.blank_frames {
                return Ok(RgbImage::new(0, 0));
            }
            Ok(RgbImage::from_fn(64, 48, |x, y| Rgb([x as u8 * 3, y as u8 * 5, 90])))
        }

        fn grab_still(&mut self) -> Result<Option<EncodedStill>> {
            Ok(self.still.clone().map(|bytes| EncodedStill { mime: "image/jpeg", bytes }))
        }

        fn close(&mut self) {
            self.opened = false;
            self.close_calls += 1;
        }
    }

    fn settings() -> CameraConfig {
        CameraConfig {
            device_index: 0,
            width: 640,
            height: 480,
            warmup_frames: 0,
            warmup_delay_ms: 0,
            ready_timeout_ms: 50,
        }
    }

    #[test]
    fn permission_denied_is_classified_and_reported() {
        let device = FakeDevice {
            open_error: Some(io::ErrorKind::PermissionDenied),
            ..Default::default()
        };
        let mut camera = CameraController::new(device, settings());

        let err = camera.initialize().unwrap_err();
        match &err {
            EnrollError::DeviceAccess { kind, message } => {
                assert_eq!(*kind, DeviceAccessKind::PermissionDenied);
                assert!(message.starts_with(kind.user_message()));
            }
            other => panic!("expected device access error, got {:?}", other),
        }
        assert!(err.to_string().contains("Camera access was denied"));
        assert!(!camera.is_ready());
    }

    #[test]
    fn missing_device_is_not_found() {
        let device = FakeDevice { open_error: Some(io::ErrorKind::NotFound), ..Default::default() };
        let mut camera = CameraController::new(device, settings());
        match camera.initialize() {
            Err(EnrollError::DeviceAccess { kind, .. }) => {
                assert_eq!(kind, DeviceAccessKind::NotFound)
            }
            other => panic!("expected device access error, got {:?}", other),
        }
    }

    #[test]
    fn no_decoded_frame_times_out_as_generic_error() {
        let device = FakeDevice { blank_frames: true, ..Default::default() };
        let mut camera = CameraController::new(device, settings());
        match camera.initialize() {
            Err(EnrollError::DeviceAccess { kind, .. }) => {
                assert_eq!(kind, DeviceAccessKind::Generic)
            }
            other => panic!("expected device access error, got {:?}", other),
        }
        assert!(!camera.device.opened);
    }

    #[test]
    fn capture_before_initialize_is_not_ready() {
        let mut camera = CameraController::new(FakeDevice::default(), settings());
        assert!(matches!(camera.capture_photo(), Err(EnrollError::CaptureNotReady)));
    }

    #[test]
    fn native_still_wins_over_frame_export() {
        let device = FakeDevice { still: Some(vec![0xAB; 512]), ..Default::default() };
        let mut camera = CameraController::new(device, settings());
        camera.initialize().unwrap();

        let image = camera.capture_photo().unwrap();
        assert_eq!(image.mime, "image/jpeg");
        assert_eq!(image.decode_bytes().unwrap(), vec![0xAB; 512]);
    }

    #[test]
    fn near_empty_still_falls_back_to_export() {
        let device = FakeDevice { still: Some(vec![1, 2, 3]), ..Default::default() };
        let mut camera = CameraController::new(device, settings());
        camera.initialize().unwrap();

        let image = camera.capture_photo().unwrap();
        let decoded = image::load_from_memory(&image.decode_bytes().unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn cleanup_is_idempotent() {
        let mut camera = CameraController::new(FakeDevice::default(), settings());
        camera.cleanup();
        camera.initialize().unwrap();
        assert!(camera.is_ready());

        camera.cleanup();
        camera.cleanup();
        assert!(!camera.is_ready());
        assert_eq!(camera.device.close_calls, 1);
    }

    #[test]
    fn warmup_reads_come_from_the_single_open_stream() {
        let mut config = settings();
        config.warmup_frames = 3;
        let mut camera = CameraController::new(FakeDevice::default(), config);
        camera.initialize().unwrap();

        assert_eq!(camera.device.open_calls, 1);
        // three discarded warm-up frames plus the first decoded one
        assert_eq!(camera.device.read_calls, 4);

        camera.current_frame().unwrap();
        camera.capture_photo().unwrap();
        assert_eq!(camera.device.open_calls, 1);
        assert_eq!(camera.device.close_calls, 0);
    }
}
