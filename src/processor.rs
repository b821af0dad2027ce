use crate::annotate::{detection_feedback, draw_faces, draw_status, WHITE};
use crate::capture::FrameSource;
use crate::detect::FaceDetector;
use crate::pacing::FramePacer;
use crate::stream::SharedFrame;
use crate::Result;
use opencv::core::Mat;
use std::time::Instant;

/// Detects faces on `frame` and draws the result onto it. Returns the face count.
pub fn process_frame(detector: &mut impl FaceDetector, frame: &mut Mat) -> Result<usize> {
    let faces = detector.detect(frame)?;
    if faces.is_empty() {
        tracing::info!("No faces detected");
    } else {
        tracing::info!(faces = faces.len(), "Faces detected");
    }
    draw_status(frame, &detection_feedback(faces.len()), WHITE)?;
    draw_faces(frame, &faces)?;
    Ok(faces.len())
}

/// Capture, detect, annotate and publish until something fails.
///
/// Meant to run on its own thread; the HTTP side keeps serving the last
/// published frame after this returns.
pub fn run_processor(
    mut source: impl FrameSource,
    mut detector: impl FaceDetector,
    shared: SharedFrame,
    pacer: FramePacer,
) -> Result<()> {
    tracing::info!("Frame processor started");
    let mut frame_counter: u64 = 0;
    loop {
        let started = Instant::now();
        frame_counter += 1;

        let mut frame = source.next_frame()?;
        tracing::debug!(frame = frame_counter, "Capture OK, starting face detection");

        process_frame(&mut detector, &mut frame)?;
        shared.publish(&frame)?;

        tracing::debug!(
            frame = frame_counter,
            elapsed = ?started.elapsed(),
            "Processing complete"
        );
        pacer.pace(started);
    }
}
