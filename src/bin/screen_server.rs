use anyhow::Context;
use clap::Parser;
use face_monitor::{
    processor::run_processor, server, Config, FramePacer, LandmarkDetector, ScreenSource,
    SharedFrame,
};
use std::net::IpAddr;
use std::path::PathBuf;

/// Screen region face recognition served as an MJPEG stream.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding the face detector and encoder models.
    #[arg(long, env = "FACE_MONITOR_MODEL_DIR")]
    model_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    face_monitor::init_tracing();
    let args: Args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(model_dir) = args.model_dir {
        config.models.dir = model_dir;
    }
    let mut settings = config.screen_server;
    if let Some(bind) = args.bind {
        settings.bind = bind;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    let addr = settings.addr();

    let shared = SharedFrame::new();
    let processor_frame = shared.clone();
    let models = config.models.clone();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let setup = LandmarkDetector::new(&models, settings.detection_scale)
            .and_then(|detector| Ok((detector, ScreenSource::new(settings.region)?)));
        let (detector, source) = match setup {
            Ok(parts) => {
                let _ = ready_tx.send(Ok(()));
                parts
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        tracing::info!(region = ?settings.region, "Starting screen capture processor");
        let pacer = FramePacer::new(settings.frame_interval());
        if let Err(e) = run_processor(source, detector, processor_frame, pacer) {
            tracing::error!("Frame processor stopped: {e}");
        }
    });
    ready_rx
        .recv()
        .context("Frame processor exited during setup")?
        .context("Failed to set up face detection and screen capture")?;

    server::serve(addr, shared).await?;
    Ok(())
}
