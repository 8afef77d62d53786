//! Device collaborator contracts.
//!
//! The agent core never talks to a transport directly. Screen capture and
//! input injection are reached through the traits below, implemented by the
//! surrounding application (ADB, scrcpy stream, emulator, test double).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

/// Device collaborator errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device transport is gone and reconnection failed. Terminal for
    /// the current task.
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("device command failed: {0}")]
    Command(String),
    #[error("screen capture failed: {0}")]
    Screenshot(String),
}

/// One captured screen frame.
///
/// `width`/`height` are the ORIGINAL device dimensions, not the size of the
/// (possibly downscaled) transmitted image. Coordinate mapping depends on
/// the original dimensions.
#[derive(Debug, Clone)]
pub struct Frame {
    pub base64_data: String,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(base64_data: String, width: u32, height: u32) -> Self {
        Self {
            base64_data,
            width,
            height,
        }
    }

    /// Build a frame from raw PNG bytes and the original screen dimensions.
    pub fn from_png_bytes(png: &[u8], width: u32, height: u32) -> Self {
        Self {
            base64_data: STANDARD.encode(png),
            width,
            height,
        }
    }
}

/// Provides the current screen state.
///
/// `frame` may return `Ok(None)` when no frame is currently available
/// (e.g. the stream has not produced one yet); the agent treats that as a
/// recoverable step failure, not a terminal condition.
#[async_trait]
pub trait ScreenSource: Send + Sync {
    async fn frame(&self) -> Result<Option<Frame>, DeviceError>;

    /// Human-readable name of the foreground app ("System Home" when
    /// nothing is recognized).
    async fn foreground_app(&self) -> Result<String, DeviceError>;
}

/// Input operations on the device.
///
/// All coordinates are absolute pixels; the dispatcher converts from the
/// model's normalized space before calling in. Implementations should
/// return `Err` on transport failures; the dispatcher converts any error
/// into a failed (non-finishing) action result.
#[async_trait]
pub trait DeviceOps: Send + Sync {
    async fn tap(&self, x: i64, y: i64) -> Result<(), DeviceError>;
    async fn double_tap(&self, x: i64, y: i64) -> Result<(), DeviceError>;
    async fn long_press(&self, x: i64, y: i64) -> Result<(), DeviceError>;
    async fn swipe(&self, start: (i64, i64), end: (i64, i64)) -> Result<(), DeviceError>;
    async fn type_text(&self, text: &str) -> Result<(), DeviceError>;

    /// Launch an app by display name. Returns `false` when the name is not
    /// known to the implementation.
    async fn launch_app(&self, app_name: &str) -> Result<bool, DeviceError>;

    async fn back(&self) -> Result<(), DeviceError>;
    async fn home(&self) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_png_bytes() {
        let frame = Frame::from_png_bytes(b"\x89PNG\r\n\x1a\n", 1080, 2400);
        assert_eq!(frame.width, 1080);
        assert_eq!(frame.height, 2400);
        assert_eq!(frame.base64_data, STANDARD.encode(b"\x89PNG\r\n\x1a\n"));
    }
}
