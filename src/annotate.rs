use crate::detect::Face;
use crate::Result;
use opencv::core::{Mat, Point, Scalar, VecN};
use opencv::imgproc;
use std::time::{Duration, Instant};

pub const GREEN: Scalar = VecN([0.0, 255.0, 0.0, 0.0]);
pub const WHITE: Scalar = VecN([255.0, 255.0, 255.0, 0.0]);

const TEXT_ORIGIN: Point = Point { x: 10, y: 30 };
const FPS_WINDOW: u32 = 30;

pub fn detection_feedback(count: usize) -> String {
    if count > 0 {
        format!("Faces detected: {count}")
    } else {
        "No faces detected".to_string()
    }
}

/// Writes an anti-aliased status line in the top-left corner of the frame.
pub fn draw_status(frame: &mut Mat, text: &str, color: Scalar) -> Result<()> {
    put_corner_text(frame, text, color, imgproc::LINE_AA)
}

/// Same placement as [`draw_status`], drawn with plain 8-connected strokes.
pub fn draw_overlay(frame: &mut Mat, text: &str, color: Scalar) -> Result<()> {
    put_corner_text(frame, text, color, imgproc::LINE_8)
}

fn put_corner_text(frame: &mut Mat, text: &str, color: Scalar, line_type: i32) -> Result<()> {
    imgproc::put_text(
        frame,
        text,
        TEXT_ORIGIN,
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.7,
        color,
        2,
        line_type,
        false,
    )?;
    Ok(())
}

pub fn draw_faces(frame: &mut Mat, faces: &[Face]) -> Result<()> {
    for face in faces {
        imgproc::rectangle(frame, face.bounds, GREEN, 2, imgproc::LINE_8, 0)?;
    }
    Ok(())
}

pub fn bgr(color: [u8; 3]) -> Scalar {
    Scalar::new(
        f64::from(color[0]),
        f64::from(color[1]),
        f64::from(color[2]),
        0.0,
    )
}

/// Frame rate averaged over windows of 30 frames.
pub struct FpsCounter {
    frames: u32,
    window_start: Instant,
    fps: f64,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            frames: 0,
            window_start: now,
            fps: 0.0,
        }
    }

    /// Counts a frame. The reported rate only changes when a window closes.
    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f64 {
        self.frames += 1;
        if self.frames % FPS_WINDOW == 0 {
            let elapsed = now.duration_since(self.window_start).max(Duration::from_micros(1));
            self.fps = f64::from(self.frames) / elapsed.as_secs_f64();
            self.frames = 0;
            self.window_start = now;
        }
        self.fps
    }

    pub fn overlay_text(&self, faces: usize) -> String {
        format!("FPS: {:.1} | Faces: {}", self.fps, faces)
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}
