use clap::Parser;
use face_monitor::display::{KeyCommand, Window};
use face_monitor::{
    draw_faces, CaptureTarget, Config, FaceDetector, FrameSource, HaarDetector, StreamSource,
};
use std::path::PathBuf;

/// Haar cascade face detection on a network camera stream.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stream URL or local device index.
    #[arg(short, long)]
    url: Option<CaptureTarget>,
}

fn main() -> anyhow::Result<()> {
    face_monitor::init_tracing();
    let args: Args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let settings = config.camera_viewer;
    let target = args
        .url
        .unwrap_or_else(|| CaptureTarget::Url(settings.url.clone()));

    let mut source = StreamSource::open(target)?;
    let mut detector = HaarDetector::new(&config.models.cascade, settings.haar)?;
    let window = Window::new("Camera Face Detection")?;

    loop {
        let mut frame = source.next_frame()?;
        let faces = detector.detect(&frame)?;
        draw_faces(&mut frame, &faces)?;
        window.show(&frame)?;

        if window.poll_command()? == Some(KeyCommand::Quit) {
            break;
        }
    }

    Ok(())
}
