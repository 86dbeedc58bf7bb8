use face_enroll::{
    camera::{CameraController, CapturedImage, V4lDevice},
    cli::{self, AsciiRenderer, EnrollKey},
    common::{Config, DevMode, EnrollError},
    core::{load_configured_detector, DetectionResult, DetectorMode, Orientation},
    enroll::{CaptureOutcome, Enrollment, EnrollmentSettings, FormField, SessionState},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{cursor, style, terminal};
use image::Rgb;
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "face-enroll")]
#[command(about = "Guided multi-angle face photo capture for registration")]
struct Cli {
    /// Enable development mode (saves captures and debug images locally)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file to use instead of the default search path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List cameras and show which one auto-detection picks
    DetectCamera,
    /// Open the camera and save one frame and one still capture
    TestCamera,
    /// Run face detection and orientation on one frame
    TestDetection,
    /// Run the interactive multi-angle enrollment
    Enroll {
        /// Write the submitted photo list JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dev_mode = DevMode::new(cli.dev)?;

    // The enroll UI owns the terminal, so its logs go to a file
    let log_file = match cli.command {
        Commands::Enroll { .. } => Some(dev_mode.get_log_path()),
        _ => None,
    };
    setup_logging(cli.dev, log_file.as_deref())?;

    match cli.command {
        Commands::DetectCamera => detect_camera()?,
        Commands::TestCamera => {
            println!("Testing camera...");
            test_camera(&load_config(cli.config.as_deref())?, &dev_mode)?;
        }
        Commands::TestDetection => {
            println!("Testing face detection...");
            test_detection(&load_config(cli.config.as_deref())?, &dev_mode)?;
        }
        Commands::Enroll { output } => {
            let config = load_config(cli.config.as_deref())?;
            run_enrollment(config, &dev_mode, output).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

fn detect_camera() -> Result<()> {
    println!("🔍 Detecting available cameras...\n");

    let cameras = V4lDevice::list_all_cameras()?;
    if cameras.is_empty() {
        println!("❌ No cameras found!");
        println!("\nTroubleshooting:");
        println!("  1. Check if cameras are connected");
        println!("  2. Ensure you have permission to access /dev/video*");
        println!("  3. Try adding your user to the 'video' group");
        return Ok(());
    }

    for camera in &cameras {
        println!("📷 /dev/video{}: {}", camera.index, camera.name);
        for feature in &camera.features {
            println!("   - {}", feature);
        }
        println!();
    }

    println!("═══════════════════════════════════════════════════════");
    let selected = V4lDevice::detect_color_camera()?;
    println!("✅ Auto-detected camera: /dev/video{}", selected);
    println!("\nThis will be used when device_index = 999 (auto-detect)");
    println!("\n📝 To pick a camera manually, set in the config:");
    println!("   [camera]");
    println!("   device_index = <NUMBER>");
    Ok(())
}

fn open_camera(config: &Config) -> Result<CameraController<V4lDevice>> {
    let device = V4lDevice::from_config_index(config.camera.device_index)?;
    Ok(CameraController::new(device, config.camera.clone()))
}

fn test_camera(config: &Config, dev_mode: &DevMode) -> Result<()> {
    let mut camera = open_camera(config)?;
    camera.initialize()?;

    let (width, height) = camera.dimensions();
    println!("Camera ready at {}x{}", width, height);

    let frame = camera.current_frame()?;
    let frame_path = dev_mode.get_capture_path("test_frame", "png");
    frame.save(&frame_path)?;
    println!("Saved live frame to {:?}", frame_path);

    let still = camera.capture_photo()?;
    let still_path = dev_mode.get_capture_path("test_still", still.extension());
    std::fs::write(&still_path, still.decode_bytes()?)?;
    println!("Saved {} still capture to {:?}", still.mime, still_path);

    camera.cleanup();
    Ok(())
}

fn orientation_color(orientation: Orientation) -> Rgb<u8> {
    match orientation {
        Orientation::Front => Rgb([0, 255, 0]),
        Orientation::Unknown => Rgb([255, 0, 0]),
        _ => Rgb([255, 255, 0]),
    }
}

fn annotate(frame: &image::RgbImage, detection: &DetectionResult) -> image::RgbImage {
    let mut img = frame.clone();
    let face = &detection.face;
    let color = orientation_color(detection.orientation.orientation);

    let x1 = face.x1.max(0.0) as i32;
    let y1 = face.y1.max(0.0) as i32;
    let width = (face.width().max(1.0)) as u32;
    let height = (face.height().max(1.0)) as u32;
    draw_hollow_rect_mut(&mut img, Rect::at(x1, y1).of_size(width, height), color);
    if width > 2 && height > 2 {
        let inner = Rect::at(x1 + 1, y1 + 1).of_size(width - 2, height - 2);
        draw_hollow_rect_mut(&mut img, inner, color);
    }

    if let Some(landmarks) = &detection.landmarks {
        let points = landmarks
            .left_eye
            .iter()
            .chain(&landmarks.right_eye)
            .chain(&landmarks.nose)
            .chain(&landmarks.mouth);
        for point in points {
            let center = (point.x as i32, point.y as i32);
            draw_filled_circle_mut(&mut img, center, 2, Rgb([0, 255, 255]));
        }
    }

    img
}

fn test_detection(config: &Config, dev_mode: &DevMode) -> Result<()> {
    let mut camera = open_camera(config)?;
    camera.initialize()?;

    let mut detector = match load_configured_detector(config) {
        Ok(detector) => detector,
        Err(e) => {
            println!("⚠️  {} - using basic detector", e);
            face_enroll::core::FaceDetector::basic()
        }
    };
    println!("Detector mode: {:?}", detector.mode());

    println!("Capturing frame from camera {}...", config.camera.device_index);
    let frame = camera.current_frame()?;
    camera.cleanup();

    let save_path = dev_mode.get_capture_path("detection_test", "png");
    frame.save(&save_path)?;
    println!("Saved original image to {:?}", save_path);

    match detector.detect(&frame)? {
        Some(detection) => {
            let face = &detection.face;
            println!(
                "Face at ({:.0}, {:.0})-({:.0}, {:.0}) confidence {:.3}",
                face.x1, face.y1, face.x2, face.y2, face.confidence
            );
            println!(
                "Orientation: {} (confidence {:.2})",
                detection.orientation.orientation.as_str(),
                detection.orientation.confidence
            );

            let debug_path = dev_mode.get_debug_path("detection_annotated");
            annotate(&frame, &detection).save(&debug_path)?;
            println!("\nSaved annotated image to: {:?}", debug_path);
        }
        None => println!("No face detected"),
    }

    Ok(())
}

async fn run_enrollment(config: Config, dev_mode: &DevMode, output: Option<PathBuf>) -> Result<()> {
    let camera = open_camera(&config)?;
    let settings = EnrollmentSettings::from_config(&config);
    let detector_config = config.clone();

    let mut enrollment = Enrollment::initialize(camera, settings, move || {
        load_configured_detector(&detector_config)
    })
    .await?;

    if enrollment.detector_mode() == DetectorMode::Basic {
        println!(
            "⚠️  Landmark model unavailable. Head angle guidance is disabled; \
             capture each angle manually."
        );
    }

    enrollment.start_polling();

    terminal::enable_raw_mode().context("Failed to enable raw mode")?;
    cli::clear_screen().ok();
    crossterm::execute!(io::stdout(), cursor::Hide).ok();

    let renderer = AsciiRenderer::new(None, None);
    let result = interactive_loop(&mut enrollment, &renderer, dev_mode).await;

    crossterm::execute!(io::stdout(), cursor::Show).ok();
    terminal::disable_raw_mode().ok();
    cli::clear_screen().ok();
    enrollment.shutdown().await;

    match result? {
        Some(field) => {
            let count = enrollment.photos().len();
            if count < enrollment.session().required_angles().len() {
                let total = enrollment.session().required_angles().len();
                println!("⚠️  Submitting {} of {} angles", count, total);
            }
            match output {
                Some(path) => {
                    std::fs::write(&path, &field.value)?;
                    println!(
                        "✅ Wrote {} photo(s) for field '{}' to {:?}",
                        count, field.name, path
                    );
                }
                None => println!("{}", field.value),
            }
        }
        None => println!("Enrollment cancelled"),
    }

    Ok(())
}

/// Returns the submitted field, or `None` when the user aborts.
async fn interactive_loop(
    enrollment: &mut Enrollment<V4lDevice>,
    renderer: &AsciiRenderer,
    dev_mode: &DevMode,
) -> Result<Option<FormField>> {
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
    let mut status = String::new();

    loop {
        redraw.tick().await;

        if let Ok(frame) = enrollment.preview_frame().await {
            let detection = enrollment.latest_detection();
            let guidance = enrollment.guidance();
            let screen =
                renderer.render(&frame, detection.as_ref(), enrollment.session(), &guidance);
            crossterm::execute!(
                io::stdout(),
                cursor::MoveTo(0, 0),
                style::Print(&screen),
                cursor::MoveTo(0, (renderer.height() + 5) as u16),
                terminal::Clear(terminal::ClearType::CurrentLine),
                style::Print(&status)
            )
            .ok();
        }

        let key = cli::poll_key(Duration::from_millis(0)).context("Failed to read input")?;
        match key {
            Some(EnrollKey::Capture) => {
                status = match enrollment.capture_photo().await {
                    Ok(CaptureOutcome::Appended { step }) => {
                        save_dev_capture(enrollment, dev_mode, step);
                        format!("📸 Captured step {}", step)
                    }
                    Ok(CaptureOutcome::Retaken { step }) => {
                        save_dev_capture(enrollment, dev_mode, step);
                        format!("📸 Retook step {}", step)
                    }
                    Ok(CaptureOutcome::Ignored) => {
                        "Nothing to retake, every step was skipped".to_string()
                    }
                    Err(EnrollError::NoFaceDetected) => {
                        "No face detected. Please position your face in the frame.".to_string()
                    }
                    Err(e) => format!("Capture failed: {}", e),
                };
            }
            Some(EnrollKey::Skip) => {
                status = if enrollment.skip_photo() {
                    "Step skipped".to_string()
                } else {
                    "All steps done".to_string()
                };
            }
            Some(EnrollKey::Submit) => match enrollment.submit() {
                Ok(field) => return Ok(Some(field)),
                Err(e) => status = e.to_string(),
            },
            Some(EnrollKey::Abort) => return Ok(None),
            None => {}
        }

        if enrollment.state() == SessionState::AllComplete && status.is_empty() {
            status = "All angles captured. Press F to submit.".to_string();
        }
    }
}

fn save_dev_capture(enrollment: &Enrollment<V4lDevice>, dev_mode: &DevMode, step: usize) {
    if !dev_mode.is_enabled() {
        return;
    }
    let Some(photo) = enrollment.photos().iter().find(|p| p.step == step) else {
        return;
    };
    let Some(image) = CapturedImage::from_data_url(&photo.data_url) else {
        return;
    };

    let prefix = format!("enroll_{}_{}", step, photo.angle);
    let path = dev_mode.get_capture_path(&prefix, image.extension());
    match image.decode_bytes().map(|bytes| std::fs::write(&path, bytes)) {
        Ok(Ok(())) => tracing::debug!("Saved capture to {:?}", path),
        Ok(Err(e)) => tracing::warn!("Failed to save capture: {}", e),
        Err(e) => tracing::warn!("Failed to decode capture: {}", e),
    }
}

fn setup_logging(dev_mode: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if dev_mode { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_file(dev_mode)
        .with_line_number(dev_mode)
        .with_thread_ids(dev_mode);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}
