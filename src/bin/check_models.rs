use anyhow::{bail, Context};
use clap::Parser;
use face_monitor::{Config, HaarDetector, HaarParams, LandmarkDetector};
use std::path::PathBuf;

/// Checks that the face models can be found and loaded.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the face detector and encoder models.
    #[arg(long, env = "FACE_MONITOR_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Also print OpenCV build information.
    #[arg(long)]
    build_info: bool,
}

fn main() -> anyhow::Result<()> {
    face_monitor::init_tracing();
    let args: Args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(model_dir) = args.model_dir {
        config.models.dir = model_dir;
    }
    let models = &config.models;

    tracing::info!(version = %opencv::core::get_version_string()?, "OpenCV");
    if args.build_info {
        println!("{}", opencv::core::get_build_information()?);
    }

    if !models.dir.is_dir() {
        bail!("Models directory does not exist: {}", models.dir.display());
    }
    for path in [models.detector_path(), models.encoder_path()] {
        if !path.is_file() {
            bail!("Model file does not exist: {}", path.display());
        }
        tracing::info!(path = %path.display(), "Found model file");
    }

    tracing::info!("Attempting to load the face models");
    LandmarkDetector::new(models, 1.0).context("Face detector or encoder failed to load")?;
    tracing::info!("Face detector and encoder loaded");

    HaarDetector::new(&models.cascade, HaarParams::default())
        .context("Haar cascade failed to load")?;

    tracing::info!("All models are usable");
    Ok(())
}
