pub mod annotate;
pub mod capture;
pub mod config;
pub mod detect;
pub mod display;
pub mod pacing;
pub mod processor;
pub mod server;
pub mod stream;

use opencv::imgproc;
use opencv::prelude::*;
use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub use annotate::{detection_feedback, draw_faces, draw_overlay, draw_status, FpsCounter};
pub use capture::{CaptureRegion, CaptureTarget, FrameSource, ScreenSource, StreamSource};
pub use config::Config;
pub use detect::{Face, FaceDetector, HaarDetector, HaarParams, LandmarkDetector};
pub use pacing::FramePacer;
pub use stream::SharedFrame;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("OpenCV error {0}")]
    OpenCv(#[from] opencv::Error),
    #[error("Screen capture error {0}")]
    ScreenCapture(#[from] xcap::XCapError),
    #[error("IO error {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file {0}")]
    Config(#[from] toml::de::Error),
    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("Haar cascade could not be loaded from {0}")]
    CascadeNotLoaded(String),
    #[error("Capture region {region:?} does not fit inside monitor of {width}x{height}")]
    RegionOutOfBounds {
        region: CaptureRegion,
        width: u32,
        height: u32,
    },
    #[error("Cannot open video stream {0}")]
    StreamUnavailable(String),
    #[error("JPEG encoding failed")]
    EncodeFailed,
    #[error("Shared frame lock poisoned")]
    LockPoisoned,
}

/// Installs the fmt subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn convert_to_grayscale(image: &Mat) -> Result<Mat> {
    let mut gray: Mat = Mat::default();
    imgproc::cvt_color_def(image, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

#[cfg(test)]
pub(crate) fn blank_frame(width: i32, height: i32) -> Mat {
    Mat::new_rows_cols_with_default(
        height,
        width,
        opencv::core::CV_8UC3,
        opencv::core::Scalar::all(0.),
    )
    .expect("allocate blank frame")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grayscale_has_single_channel() {
        let frame = blank_frame(64, 48);
        let gray = convert_to_grayscale(&frame).unwrap();
        assert_eq!(gray.channels(), 1);
        assert_eq!(gray.rows(), 48);
        assert_eq!(gray.cols(), 64);
    }

    #[test]
    fn missing_model_error_names_the_path() {
        let err = Error::ModelNotFound(PathBuf::from("models/missing.onnx"));
        assert_eq!(err.to_string(), "Model file not found: models/missing.onnx");
    }
}
