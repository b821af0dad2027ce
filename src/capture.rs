use crate::{Error, Result};
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::{imgproc, videoio};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use xcap::image::imageops::{self, FilterType};
use xcap::image::RgbaImage;
use xcap::Monitor;

/// Anything that yields BGR frames one at a time.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Mat>;
}

/// Screen rectangle in virtual desktop coordinates.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct CaptureRegion {
    pub top: i32,
    pub left: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    /// Offset of the region inside a monitor placed at `(monitor_x, monitor_y)`
    /// with the given size, or `None` when the region sticks out of it.
    pub fn offset_within(
        &self,
        monitor_x: i32,
        monitor_y: i32,
        monitor_width: u32,
        monitor_height: u32,
    ) -> Option<(u32, u32)> {
        let x = u32::try_from(self.left.checked_sub(monitor_x)?).ok()?;
        let y = u32::try_from(self.top.checked_sub(monitor_y)?).ok()?;
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let right = x.checked_add(self.width)?;
        let bottom = y.checked_add(self.height)?;
        if right > monitor_width || bottom > monitor_height {
            return None;
        }
        Some((x, y))
    }

    /// The region as a `(x, y, width, height)` pixel rectangle of a screenshot
    /// that is `image_width` x `image_height` pixels. Monitor geometry is in
    /// desktop units, which differ from pixels on scaled (HiDPI) displays.
    pub fn pixel_rect(
        &self,
        monitor: (i32, i32, u32, u32),
        image_width: u32,
        image_height: u32,
    ) -> Option<(u32, u32, u32, u32)> {
        let (monitor_x, monitor_y, monitor_width, monitor_height) = monitor;
        if [monitor_width, monitor_height, image_width, image_height].contains(&0) {
            return None;
        }
        let (x, y) = self.offset_within(monitor_x, monitor_y, monitor_width, monitor_height)?;
        let scale = |value: u32, pixels: u32, units: u32| {
            (u64::from(value) * u64::from(pixels) / u64::from(units)) as u32
        };
        let px = scale(x, image_width, monitor_width);
        let py = scale(y, image_height, monitor_height);
        let pw = scale(self.width, image_width, monitor_width).clamp(1, image_width - px);
        let ph = scale(self.height, image_height, monitor_height).clamp(1, image_height - py);
        Some((px, py, pw, ph))
    }
}

/// Grabs a fixed region of the monitor that contains its top-left corner.
///
/// The region is given in desktop coordinates. On a scaled display the
/// cropped pixels are resized back to the region size, so frames are always
/// `region.width` x `region.height`.
pub struct ScreenSource {
    monitor: Monitor,
    region: CaptureRegion,
}

impl ScreenSource {
    pub fn new(region: CaptureRegion) -> Result<Self> {
        let monitor = Monitor::from_point(region.left, region.top)?;
        tracing::info!(
            monitor = monitor.name(),
            ?region,
            "Screen capture source ready"
        );
        Ok(Self { monitor, region })
    }

    fn grab(&self) -> Result<RgbaImage> {
        let monitor = (
            self.monitor.x(),
            self.monitor.y(),
            self.monitor.width(),
            self.monitor.height(),
        );
        let screenshot = self.monitor.capture_image()?;
        let (image_width, image_height) = screenshot.dimensions();
        let (x, y, width, height) = self
            .region
            .pixel_rect(monitor, image_width, image_height)
            .ok_or(Error::RegionOutOfBounds {
                region: self.region,
                width: monitor.2,
                height: monitor.3,
            })?;
        let cropped = imageops::crop_imm(&screenshot, x, y, width, height).to_image();
        if (width, height) == (self.region.width, self.region.height) {
            return Ok(cropped);
        }
        Ok(imageops::resize(
            &cropped,
            self.region.width,
            self.region.height,
            FilterType::Triangle,
        ))
    }
}

impl FrameSource for ScreenSource {
    fn next_frame(&mut self) -> Result<Mat> {
        let image = self.grab()?;
        rgba_to_bgr(image.as_raw(), image.height())
    }
}

/// Converts tightly packed RGBA rows into a 3 channel BGR `Mat`.
pub fn rgba_to_bgr(rgba: &[u8], height: u32) -> Result<Mat> {
    let packed = Mat::from_slice(rgba)?;
    let rgba_mat = packed.reshape(4, height as i32)?.try_clone()?;
    let mut bgr = Mat::default();
    imgproc::cvt_color_def(&rgba_mat, &mut bgr, imgproc::COLOR_RGBA2BGR)?;
    Ok(bgr)
}

/// What a `StreamSource` opens: a local device index or a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    Device(i32),
    Url(String),
}

impl FromStr for CaptureTarget {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.parse::<i32>() {
            Ok(index) => CaptureTarget::Device(index),
            Err(_) => CaptureTarget::Url(s.to_string()),
        })
    }
}

impl fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureTarget::Device(index) => write!(f, "device {index}"),
            CaptureTarget::Url(url) => write!(f, "{url}"),
        }
    }
}

/// OpenCV `VideoCapture` that reopens itself whenever a read fails.
pub struct StreamSource {
    target: CaptureTarget,
    capture: videoio::VideoCapture,
}

impl StreamSource {
    /// Fails if the first connection cannot be opened.
    pub fn open(target: CaptureTarget) -> Result<Self> {
        tracing::info!(stream = %target, "Connecting to video stream");
        let capture = open_capture(&target)?;
        if !capture.is_opened()? {
            return Err(Error::StreamUnavailable(target.to_string()));
        }
        tracing::info!(stream = %target, "Connected to video stream");
        Ok(Self { target, capture })
    }

    fn reconnect(&mut self) {
        match open_capture(&self.target) {
            Ok(capture) => self.capture = capture,
            Err(e) => tracing::warn!(stream = %self.target, "Reconnect failed: {e}"),
        }
    }
}

impl FrameSource for StreamSource {
    fn next_frame(&mut self) -> Result<Mat> {
        loop {
            let mut frame = Mat::default();
            let read = self.capture.read(&mut frame).unwrap_or(false);
            if read && !frame.empty() {
                return Ok(frame);
            }
            tracing::warn!(stream = %self.target, "Frame read failed, reconnecting");
            self.reconnect();
        }
    }
}

fn open_capture(target: &CaptureTarget) -> Result<videoio::VideoCapture> {
    let capture = match target {
        CaptureTarget::Device(index) => videoio::VideoCapture::new(*index, videoio::CAP_ANY)?,
        CaptureTarget::Url(url) => videoio::VideoCapture::from_file(url, videoio::CAP_ANY)?,
    };
    Ok(capture)
}
