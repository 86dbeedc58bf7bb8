use crate::core::{DetectionResult, FaceBox};
use crate::enroll::{CaptureSession, Guidance, Tone};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    style::{Color, Stylize},
    terminal::{self, ClearType},
};
use image::RgbImage;
use std::io::{self, Write};
use std::time::Duration;

const ASCII_RAMP: &str = " .·:;+=xX#@";
const DEFAULT_WIDTH: usize = 80;
const DEFAULT_HEIGHT: usize = 30;

/// Keys the enrollment loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollKey {
    Capture,
    Skip,
    Submit,
    Abort,
}

impl EnrollKey {
    pub fn from_code(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char(' ') | KeyCode::Enter => Some(Self::Capture),
            KeyCode::Char('s') | KeyCode::Char('S') => Some(Self::Skip),
            KeyCode::Char('f') | KeyCode::Char('F') => Some(Self::Submit),
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => Some(Self::Abort),
            _ => None,
        }
    }
}

pub struct AsciiRenderer {
    width: usize,
    height: usize,
}

impl AsciiRenderer {
    pub fn new(width: Option<usize>, height: Option<usize>) -> Self {
        let (term_width, term_height) = terminal::size()
            .map(|(w, h)| (w as usize, h as usize))
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));

        // Half resolution keeps redraws cheap
        Self {
            width: width.unwrap_or((term_width / 2).min(DEFAULT_WIDTH / 2)).max(1),
            height: height
                .unwrap_or((term_height.saturating_sub(6) / 2).min(DEFAULT_HEIGHT / 2))
                .max(1),
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Frame with the face box, followed by the step progress and guidance lines.
    pub fn render(
        &self,
        frame: &RgbImage,
        detection: Option<&DetectionResult>,
        session: &CaptureSession,
        guidance: &Guidance,
    ) -> String {
        let mut grid = self.image_to_ascii(frame);

        if let Some(detection) = detection {
            let (img_width, img_height) = (frame.width() as f32, frame.height() as f32);
            self.draw_face_box(&mut grid, &detection.face, img_width, img_height);
        }

        let mut lines = self.grid_to_lines(&grid);
        lines.push(String::new());
        lines.push(format!("{}  {}", progress_bar(session), guidance.title));
        let marker = if guidance.capture_highlighted { ">>" } else { "  " };
        let message = format!("{} {}", marker, guidance.message);
        let message = format!("{:width$}", message, width = self.width);
        lines.push(message.with(tone_color(guidance.tone)).to_string());
        lines.push("[Space] capture  [S] skip  [F] submit  [Esc] cancel".to_string());

        lines
            .into_iter()
            .map(|line| format!("{:width$}", line, width = self.width))
            .collect::<Vec<_>>()
            .join("\r\n")
    }

    fn image_to_ascii(&self, image: &RgbImage) -> Vec<Vec<char>> {
        let mut grid = vec![vec![' '; self.width]; self.height];
        let gray = image::DynamicImage::ImageRgb8(image.clone()).to_luma8();
        let (img_width, img_height) = gray.dimensions();
        let ramp: Vec<char> = ASCII_RAMP.chars().collect();

        for term_y in 0..self.height {
            for term_x in 0..self.width {
                let img_x = (term_x as f32 / self.width as f32 * img_width as f32) as u32;
                let img_y = (term_y as f32 / self.height as f32 * img_height as f32) as u32;

                if img_x < img_width && img_y < img_height {
                    let brightness = gray.get_pixel(img_x, img_y)[0];
                    let idx = (brightness as usize * (ramp.len() - 1)) / 255;
                    grid[term_y][term_x] = ramp[idx];
                }
            }
        }

        grid
    }

    fn draw_face_box(
        &self,
        grid: &mut [Vec<char>],
        face: &FaceBox,
        img_width: f32,
        img_height: f32,
    ) {
        if img_width <= 0.0 || img_height <= 0.0 {
            return;
        }
        let scale = |v: f32, extent: f32, cells: usize| {
            (((v / extent) * cells as f32).max(0.0) as usize).min(cells - 1)
        };
        let scale_x = |v: f32| scale(v, img_width, self.width);
        let scale_y = |v: f32| scale(v, img_height, self.height);

        let (x1, x2) = (scale_x(face.x1), scale_x(face.x2));
        let (y1, y2) = (scale_y(face.y1), scale_y(face.y2));
        if x2 <= x1 || y2 <= y1 {
            return;
        }

        for x in (x1 + 1)..x2 {
            grid[y1][x] = '─';
            grid[y2][x] = '─';
        }
        for row in grid.iter_mut().take(y2).skip(y1 + 1) {
            row[x1] = '│';
            row[x2] = '│';
        }
        grid[y1][x1] = '┌';
        grid[y1][x2] = '┐';
        grid[y2][x1] = '└';
        grid[y2][x2] = '┘';
    }

    fn grid_to_lines(&self, grid: &[Vec<char>]) -> Vec<String> {
        grid.iter().map(|row| row.iter().take(self.width).collect()).collect()
    }
}

pub fn tone_color(tone: Tone) -> Color {
    match tone {
        Tone::Info => Color::Cyan,
        Tone::Warning => Color::Yellow,
        Tone::Success => Color::Green,
    }
}

/// One cell per required angle: captured, skipped, or still to do.
pub fn progress_bar(session: &CaptureSession) -> String {
    let cells: String = (0..session.required_angles().len())
        .map(|i| {
            if session.photos().iter().any(|p| p.step == i + 1) {
                '■'
            } else if i < session.current_step() {
                '×'
            } else {
                '□'
            }
        })
        .collect();
    format!("[{}]", cells)
}

pub fn clear_screen() -> io::Result<()> {
    crossterm::execute!(io::stdout(), terminal::Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    io::stdout().flush()
}

/// Non-blocking read of the next enrollment key, if any.
pub fn poll_key(timeout: Duration) -> io::Result<Option<EnrollKey>> {
    if event::poll(timeout)? {
        if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
            if kind == KeyEventKind::Release {
                return Ok(None);
            }
            return Ok(EnrollKey::from_code(code));
        }
    }
    Ok(None)
}
