use crate::Result;
use opencv::core::{Mat, Vector};
use opencv::highgui;
use opencv::imgcodecs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Quit,
    Save,
    ResetRegion,
}

impl KeyCommand {
    /// Maps a `wait_key` code; only the low byte is significant.
    pub fn from_key(code: i32) -> Option<Self> {
        if code < 0 {
            return None;
        }
        match (code & 0xFF) as u8 {
            b'q' => Some(KeyCommand::Quit),
            b's' => Some(KeyCommand::Save),
            b'r' => Some(KeyCommand::ResetRegion),
            _ => None,
        }
    }
}

/// A highgui window. All windows are closed on drop.
pub struct Window {
    name: String,
}

impl Window {
    pub fn new(name: &str) -> Result<Self> {
        highgui::named_window_def(name)?;
        Ok(Self {
            name: name.to_string(),
        })
    }

    pub fn show(&self, frame: &Mat) -> Result<()> {
        highgui::imshow(&self.name, frame)?;
        Ok(())
    }

    /// Pumps the GUI event loop for 1ms and returns the pressed command.
    pub fn poll_command(&self) -> Result<Option<KeyCommand>> {
        let key = highgui::wait_key(1)?;
        Ok(KeyCommand::from_key(key))
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_all_windows() {
            tracing::warn!("Failed to close windows: {e}");
        }
    }
}

pub fn snapshot_filename(unix_secs: u64) -> String {
    format!("face_detection_{unix_secs}.png")
}

/// Writes `frame` to the working directory and returns the file name.
pub fn save_snapshot(frame: &Mat) -> Result<PathBuf> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let path = PathBuf::from(snapshot_filename(secs));
    imgcodecs::imwrite(&path.to_string_lossy(), frame, &Vector::new())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(KeyCommand::from_key('q' as i32), Some(KeyCommand::Quit));
        assert_eq!(KeyCommand::from_key('s' as i32), Some(KeyCommand::Save));
        assert_eq!(KeyCommand::from_key('r' as i32), Some(KeyCommand::ResetRegion));
        assert_eq!(KeyCommand::from_key('x' as i32), None);
        assert_eq!(KeyCommand::from_key(-1), None);
    }

    #[test]
    fn modifier_bits_are_ignored() {
        assert_eq!(
            KeyCommand::from_key(0x10_0000 | 'q' as i32),
            Some(KeyCommand::Quit)
        );
    }

    #[test]
    fn snapshot_name_uses_unix_seconds() {
        assert_eq!(
            snapshot_filename(1_700_000_000),
            "face_detection_1700000000.png"
        );
    }
}
