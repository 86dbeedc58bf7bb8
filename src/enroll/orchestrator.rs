use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;

use crate::camera::{CameraController, VideoDevice};
use crate::common::{Config, EnrollError, Result};
use crate::core::{pose_matches, DetectionResult, DetectorMode, FaceDetector};
use crate::enroll::guidance::{render_guidance, Guidance};
use crate::enroll::poller::Poller;
use crate::enroll::session::{CaptureOutcome, CaptureSession, CapturedPhoto, SessionState};

#[derive(Debug, Clone)]
pub struct EnrollmentSettings {
    pub model_poll_interval: Duration,
    pub basic_poll_interval: Duration,
    pub field_name: String,
}

impl EnrollmentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model_poll_interval: Duration::from_millis(config.enrollment.model_poll_interval_ms),
            basic_poll_interval: Duration::from_millis(config.enrollment.basic_poll_interval_ms),
            field_name: config.output.field_name.clone(),
        }
    }
}

impl Default for EnrollmentSettings {
    fn default() -> Self {
        Self {
            model_poll_interval: Duration::from_millis(200),
            basic_poll_interval: Duration::from_millis(500),
            field_name: "face_photos".to_string(),
        }
    }
}

/// The named field the registration endpoint reads the photo list from.
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| EnrollError::Other(anyhow::anyhow!("{} lock poisoned", what)))
}

fn join_error(e: tokio::task::JoinError) -> EnrollError {
    EnrollError::Other(anyhow::anyhow!("background task failed: {}", e))
}

/// Read the live frame and run detection on the blocking pool.
///
/// Any failure counts as "no face" for this tick only.
async fn detect_current_frame<D: VideoDevice + 'static>(
    camera: Arc<Mutex<CameraController<D>>>,
    detector: Arc<Mutex<FaceDetector>>,
) -> Option<DetectionResult> {
    let result = tokio::task::spawn_blocking(move || -> Result<Option<DetectionResult>> {
        let frame = lock(&camera, "camera")?.current_frame()?;
        let mut detector = lock(&detector, "detector")?;
        detector.detect(&frame)
    })
    .await;

    match result {
        Ok(Ok(detection)) => detection,
        Ok(Err(e)) => {
            tracing::debug!("Detection failed for this tick: {}", e);
            None
        }
        Err(e) => {
            tracing::warn!("Detection task panicked: {}", e);
            None
        }
    }
}

/// Drives one multi-angle enrollment: camera, detector, polling, and the
/// photo buffer.
pub struct Enrollment<D: VideoDevice + 'static> {
    camera: Arc<Mutex<CameraController<D>>>,
    detector: Arc<Mutex<FaceDetector>>,
    mode: DetectorMode,
    session: CaptureSession,
    latest_tx: Arc<watch::Sender<Option<DetectionResult>>>,
    latest_rx: watch::Receiver<Option<DetectionResult>>,
    poller: Option<Poller>,
    settings: EnrollmentSettings,
    form: FormField,
}

impl<D: VideoDevice + 'static> Enrollment<D> {
    /// Bring up the camera, then the detector.
    ///
    /// A camera failure aborts before any model is loaded. A detector
    /// failure degrades to the basic skin-tone detector.
    pub async fn initialize<L>(
        camera: CameraController<D>,
        settings: EnrollmentSettings,
        load_detector: L,
    ) -> Result<Self>
    where
        L: FnOnce() -> Result<FaceDetector> + Send + 'static,
    {
        let camera = Arc::new(Mutex::new(camera));

        let init_camera = Arc::clone(&camera);
        tokio::task::spawn_blocking(move || {
            let mut camera = lock(&init_camera, "camera")?;
            camera.initialize()
        })
        .await
        .map_err(join_error)??;

        let detector = match tokio::task::spawn_blocking(load_detector).await.map_err(join_error)? {
            Ok(detector) => detector,
            Err(e) => {
                tracing::warn!("Landmark model unavailable, using basic detector: {}", e);
                FaceDetector::basic()
            }
        };
        let mode = detector.mode();
        tracing::info!(?mode, "Face detector ready");

        let session = CaptureSession::new();
        let form = FormField {
            name: settings.field_name.clone(),
            value: session.to_payload_json()?,
        };
        let (latest_tx, latest_rx) = watch::channel(None);

        Ok(Self {
            camera,
            detector: Arc::new(Mutex::new(detector)),
            mode,
            session,
            latest_tx: Arc::new(latest_tx),
            latest_rx,
            poller: None,
            settings,
            form,
        })
    }

    pub fn detector_mode(&self) -> DetectorMode {
        self.mode
    }

    pub fn poll_interval(&self) -> Duration {
        match self.mode {
            DetectorMode::Landmark => self.settings.model_poll_interval,
            DetectorMode::Basic => self.settings.basic_poll_interval,
        }
    }

    /// Start the recurring detection task. No-op when already running.
    pub fn start_polling(&mut self) {
        if self.poller.as_ref().map(|p| p.is_running()).unwrap_or(false) {
            return;
        }

        let camera = Arc::clone(&self.camera);
        let detector = Arc::clone(&self.detector);
        let latest = Arc::clone(&self.latest_tx);

        self.poller = Some(Poller::spawn(self.poll_interval(), move || {
            let camera = Arc::clone(&camera);
            let detector = Arc::clone(&detector);
            let latest = Arc::clone(&latest);
            async move {
                let detection = detect_current_frame(camera, detector).await;
                latest.send_replace(detection);
            }
        }));
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().map(|p| p.is_running()).unwrap_or(false)
    }

    /// Run a single detection pass outside the polling task.
    pub async fn poll_once(&self) -> Option<DetectionResult> {
        let detection =
            detect_current_frame(Arc::clone(&self.camera), Arc::clone(&self.detector)).await;
        self.latest_tx.send_replace(detection.clone());
        detection
    }

    /// Latest live frame for on-screen preview.
    pub async fn preview_frame(&self) -> Result<image::RgbImage> {
        let camera = Arc::clone(&self.camera);
        tokio::task::spawn_blocking(move || {
            let mut camera = lock(&camera, "camera")?;
            camera.current_frame()
        })
        .await
        .map_err(join_error)?
    }

    /// Notified whenever a tick publishes a detection.
    pub fn subscribe(&self) -> watch::Receiver<Option<DetectionResult>> {
        self.latest_tx.subscribe()
    }

    pub fn latest_detection(&self) -> Option<DetectionResult> {
        self.latest_rx.borrow().clone()
    }

    fn pose_matched(&self) -> bool {
        let latest = self.latest_rx.borrow();
        match (latest.as_ref(), self.session.current_target()) {
            (Some(detection), Some(target)) if detection.has_landmarks() => {
                pose_matches(target.pose, detection.orientation.orientation)
            }
            _ => false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state(self.pose_matched())
    }

    pub fn guidance(&self) -> Guidance {
        render_guidance(
            self.session.required_angles(),
            self.session.current_step(),
            self.latest_rx.borrow().as_ref(),
        )
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn photos(&self) -> &[CapturedPhoto] {
        self.session.photos()
    }

    pub fn form_field(&self) -> &FormField {
        &self.form
    }

    /// Capture a still for the active step, or retake the last one when done.
    ///
    /// Requires a face in the latest detection; the pose does not have to
    /// match. On any error the session is left untouched.
    pub async fn capture_photo(&mut self) -> Result<CaptureOutcome> {
        if self.latest_rx.borrow().is_none() {
            return Err(EnrollError::NoFaceDetected);
        }

        let camera = Arc::clone(&self.camera);
        let image = tokio::task::spawn_blocking(move || {
            let mut camera = lock(&camera, "camera")?;
            camera.capture_photo()
        })
        .await
        .map_err(join_error)??;

        let outcome = self.session.record_capture(image);
        self.form.value = self.session.to_payload_json()?;
        tracing::info!(?outcome, photos = self.session.photos().len(), "Photo captured");
        Ok(outcome)
    }

    /// Move to the next step without a photo.
    pub fn skip_photo(&mut self) -> bool {
        let skipped = self.session.skip();
        if skipped {
            tracing::info!(step = self.session.current_step(), "Step skipped");
        }
        skipped
    }

    /// The form field to post, once at least one photo exists.
    pub fn submit(&self) -> Result<FormField> {
        self.session.validate_submission()?;
        Ok(self.form.clone())
    }

    /// Stop polling and release the camera. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop().await;
        }
        match self.camera.lock() {
            Ok(mut camera) => camera.cleanup(),
            Err(poisoned) => poisoned.into_inner().cleanup(),
        }
    }
}
