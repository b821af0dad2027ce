use crate::config::ModelConfig;
use crate::{convert_to_grayscale, Error, Result};
use opencv::core::{self, Mat, Rect, Rect2f, Size, Vector};
use opencv::imgproc;
use opencv::objdetect::{self, FaceDetectorYN, FaceRecognizerSF};
use opencv::prelude::*;
use serde::Deserialize;
use std::path::Path;

/// A detected face in full-frame pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub bounds: Rect,
    /// Face descriptor, only filled in by detectors that compute one.
    pub encoding: Option<Vec<f32>>,
}

pub trait FaceDetector {
    /// Finds faces in a BGR frame.
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Face>>;
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct HaarParams {
    pub scale_factor: f64,
    pub min_neighbors: i32,
    /// Smallest face edge in pixels, 0 for no limit.
    pub min_size: i32,
}

impl Default for HaarParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: 30,
        }
    }
}

pub struct HaarDetector {
    classifier: objdetect::CascadeClassifier,
    params: HaarParams,
}

impl HaarDetector {
    /// `cascade` is either a path on disk or a name relative to OpenCV's
    /// sample data, e.g. `haarcascades/haarcascade_frontalface_default.xml`.
    pub fn new(cascade: &str, params: HaarParams) -> Result<Self> {
        let xml = if Path::new(cascade).is_file() {
            cascade.to_string()
        } else {
            core::find_file_def(cascade).map_err(|_| Error::CascadeNotLoaded(cascade.to_string()))?
        };
        let classifier = objdetect::CascadeClassifier::new(&xml)?;
        if classifier.empty()? {
            return Err(Error::CascadeNotLoaded(xml));
        }
        tracing::info!(cascade = %xml, ?params, "Loaded Haar cascade");
        Ok(Self { classifier, params })
    }

    pub fn detect_gray(&mut self, gray: &Mat) -> Result<Vector<Rect>> {
        let mut faces = Vector::<Rect>::new();
        self.classifier.detect_multi_scale(
            gray,
            &mut faces,
            self.params.scale_factor,
            self.params.min_neighbors,
            objdetect::CASCADE_SCALE_IMAGE,
            Size {
                width: self.params.min_size,
                height: self.params.min_size,
            },
            Size {
                width: 0,
                height: 0,
            },
        )?;
        Ok(faces)
    }
}

impl FaceDetector for HaarDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Face>> {
        let gray = convert_to_grayscale(frame)?;
        Ok(self
            .detect_gray(&gray)?
            .into_iter()
            .map(|bounds| Face {
                bounds,
                encoding: None,
            })
            .collect())
    }
}

/// YuNet detector (five landmark points per face) feeding an SFace encoder.
///
/// Detection runs on a downscaled copy of the frame; the returned bounds are
/// mapped back to the full frame.
pub struct LandmarkDetector {
    detector: core::Ptr<FaceDetectorYN>,
    encoder: core::Ptr<FaceRecognizerSF>,
    scale: f64,
}

impl LandmarkDetector {
    pub fn new(models: &ModelConfig, scale: f64) -> Result<Self> {
        let detector_path = models.detector_path();
        let encoder_path = models.encoder_path();
        for path in [&detector_path, &encoder_path] {
            if !path.is_file() {
                return Err(Error::ModelNotFound(path.clone()));
            }
        }

        tracing::info!("Loading facial recognition models");
        let detector = FaceDetectorYN::create_def(
            &detector_path.to_string_lossy(),
            "",
            Size::new(320, 320),
        )?;
        let encoder = FaceRecognizerSF::create_def(&encoder_path.to_string_lossy(), "")?;
        tracing::info!("Facial recognition models loaded");

        Ok(Self {
            detector,
            encoder,
            scale,
        })
    }

    fn encode(&mut self, small: &Mat, face_row: &impl ToInputArray) -> Result<Vec<f32>> {
        let mut aligned = Mat::default();
        self.encoder.align_crop(small, face_row, &mut aligned)?;
        let mut feature = Mat::default();
        self.encoder.feature(&aligned, &mut feature)?;
        Ok(feature.data_typed::<f32>()?.to_vec())
    }
}

impl FaceDetector for LandmarkDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Face>> {
        let mut small = Mat::default();
        imgproc::resize(
            frame,
            &mut small,
            Size::default(),
            self.scale,
            self.scale,
            imgproc::INTER_LINEAR,
        )?;
        self.detector.set_input_size(small.size()?)?;

        let mut detections = Mat::default();
        self.detector.detect(&small, &mut detections)?;

        let mut faces = Vec::with_capacity(detections.rows().max(0) as usize);
        for i in 0..detections.rows() {
            let small_bounds = Rect2f::new(
                *detections.at_2d::<f32>(i, 0)?,
                *detections.at_2d::<f32>(i, 1)?,
                *detections.at_2d::<f32>(i, 2)?,
                *detections.at_2d::<f32>(i, 3)?,
            );
            let row = detections.row(i)?.try_clone()?;
            let encoding = self.encode(&small, &row)?;
            faces.push(Face {
                bounds: scale_rect(small_bounds, 1.0 / self.scale),
                encoding: Some(encoding),
            });
        }
        Ok(faces)
    }
}

/// Multiplies every coordinate of `rect` by `factor`, rounding to pixels.
pub fn scale_rect(rect: Rect2f, factor: f64) -> Rect {
    let scale = |v: f32| (f64::from(v) * factor).round() as i32;
    Rect::new(
        scale(rect.x),
        scale(rect.y),
        scale(rect.width),
        scale(rect.height),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_scale_detections_map_back_to_full_frame() {
        let small = Rect2f::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(scale_rect(small, 1.0 / 0.25), Rect::new(40, 80, 120, 160));
    }

    #[test]
    fn scale_rect_rounds() {
        let small = Rect2f::new(1.4, 1.6, 2.5, 0.2);
        assert_eq!(scale_rect(small, 2.0), Rect::new(3, 3, 5, 0));
    }

    #[test]
    fn missing_models_are_reported() {
        let models = ModelConfig {
            dir: "definitely/not/here".into(),
            ..ModelConfig::default()
        };
        match LandmarkDetector::new(&models, 0.25) {
            Err(Error::ModelNotFound(path)) => assert_eq!(path, models.detector_path()),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn unknown_cascade_is_reported() {
        assert!(matches!(
            HaarDetector::new("no_such_cascade.xml", HaarParams::default()),
            Err(Error::CascadeNotLoaded(_))
        ));
    }

    #[test]
    #[ignore = "requires OpenCV sample data"]
    fn blank_frame_has_no_faces() {
        let mut detector = HaarDetector::new(
            &ModelConfig::default().cascade,
            HaarParams::default(),
        )
        .unwrap();
        let faces = detector.detect(&crate::blank_frame(640, 480)).unwrap();
        assert!(faces.is_empty());
    }
}
