use clap::Parser;
use face_monitor::annotate::bgr;
use face_monitor::display::{save_snapshot, KeyCommand, Window};
use face_monitor::{
    draw_overlay, Config, FaceDetector, FpsCounter, FramePacer, FrameSource, HaarDetector,
    ScreenSource,
};
use std::path::PathBuf;
use std::time::Instant;

/// Haar cascade face detection on a screen region, shown in a local window.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    face_monitor::init_tracing();
    let args: Args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let settings = config.screen_viewer;

    let mut detector = HaarDetector::new(&config.models.cascade, settings.haar)?;
    let mut source = ScreenSource::new(settings.region)?;
    let window = Window::new("Face Detection (Screen Capture)")?;
    let pacer = FramePacer::new(settings.frame_delay());
    let text_color = bgr(settings.text_color);
    let mut fps = FpsCounter::new();

    tracing::info!(region = ?settings.region, "Face detection started");
    tracing::info!("Press 'q' to quit, 's' to save screenshot, 'r' to reset region");

    loop {
        let started = Instant::now();

        let mut frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Error capturing screen: {e}");
                break;
            }
        };

        let faces = detector.detect(&frame)?;
        fps.tick();

        if settings.show_fps {
            draw_overlay(&mut frame, &fps.overlay_text(faces.len()), text_color)?;
        }

        window.show(&frame)?;

        match window.poll_command()? {
            Some(KeyCommand::Quit) => {
                tracing::info!("Quitting");
                break;
            }
            Some(KeyCommand::Save) => {
                let path = save_snapshot(&frame)?;
                tracing::info!(path = %path.display(), "Screenshot saved");
            }
            Some(KeyCommand::ResetRegion) => {
                tracing::info!("Region reset - adjust window and restart");
            }
            None => {}
        }

        pacer.pace(started);
    }

    tracing::info!("Face detection stopped");
    Ok(())
}
