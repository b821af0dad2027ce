//! TOML configuration shared by the binaries.
//!
//! Every field has a default, so a missing file or an empty section keeps
//! the stock behaviour of each program.

use crate::capture::CaptureRegion;
use crate::detect::HaarParams;
use crate::Result;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub screen_server: ScreenServerConfig,
    pub screen_viewer: ScreenViewerConfig,
    pub camera_viewer: CameraViewerConfig,
    pub models: ModelConfig,
}

impl Config {
    /// Reads `path` when given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                let config = toml::from_str(&text)?;
                tracing::info!(path = %path.display(), "Loaded config");
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScreenServerConfig {
    pub region: CaptureRegion,
    pub bind: IpAddr,
    pub port: u16,
    /// Minimum time between processed frames.
    pub frame_interval_ms: u64,
    /// Factor the frame is resized by before detection.
    pub detection_scale: f64,
}

impl ScreenServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for ScreenServerConfig {
    fn default() -> Self {
        Self {
            region: CaptureRegion {
                top: 0,
                left: 0,
                width: 640,
                height: 480,
            },
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            frame_interval_ms: 33,
            detection_scale: 0.25,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScreenViewerConfig {
    pub region: CaptureRegion,
    pub haar: HaarParams,
    pub target_fps: u32,
    pub show_fps: bool,
    /// BGR
    pub text_color: [u8; 3],
}

impl ScreenViewerConfig {
    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.target_fps.max(1)))
    }
}

impl Default for ScreenViewerConfig {
    fn default() -> Self {
        Self {
            region: CaptureRegion {
                top: 175,
                left: 640,
                width: 640,
                height: 480,
            },
            haar: HaarParams::default(),
            target_fps: 30,
            show_fps: true,
            text_color: [0, 255, 0],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraViewerConfig {
    pub url: String,
    pub haar: HaarParams,
}

impl Default for CameraViewerConfig {
    fn default() -> Self {
        Self {
            url: "http://192.168.1.30:81/stream".to_string(),
            haar: HaarParams {
                scale_factor: 1.2,
                min_neighbors: 5,
                min_size: 0,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub dir: PathBuf,
    pub detector: String,
    pub encoder: String,
    /// Looked up through OpenCV's sample data search path.
    pub cascade: String,
}

impl ModelConfig {
    pub fn detector_path(&self) -> PathBuf {
        self.dir.join(&self.detector)
    }

    pub fn encoder_path(&self) -> PathBuf {
        self.dir.join(&self.encoder)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            detector: "face_detection_yunet_2023mar.onnx".to_string(),
            encoder: "face_recognition_sface_2021dec.onnx".to_string(),
            cascade: "haarcascades/haarcascade_frontalface_default.xml".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_path_gives_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.screen_server.port, 5000);
        assert_eq!(config.screen_viewer.region.top, 175);
        assert_eq!(config.camera_viewer.haar.scale_factor, 1.2);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[screen_server]
port = 8080

[screen_viewer.region]
top = 0
left = 0
width = 320
height = 240

[models]
dir = "/opt/models"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.screen_server.port, 8080);
        assert_eq!(config.screen_server.frame_interval_ms, 33);
        assert_eq!(config.screen_viewer.region.width, 320);
        assert_eq!(config.screen_viewer.haar, HaarParams::default());
        assert_eq!(
            config.models.detector_path(),
            PathBuf::from("/opt/models/face_detection_yunet_2023mar.onnx")
        );
    }

    #[test]
    fn malformed_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[screen_server]\nport = \"not a port\"").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn frame_delay_truncates_like_integer_millis() {
        let viewer = ScreenViewerConfig::default();
        assert_eq!(viewer.frame_delay(), Duration::from_millis(33));
        assert_eq!(
            ScreenServerConfig::default().addr().to_string(),
            "0.0.0.0:5000"
        );
    }
}
