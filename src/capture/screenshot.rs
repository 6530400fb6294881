//! Frame acquisition with full-screen fallback.

use image::RgbaImage;
use tracing::{debug, warn};

use super::{Desktop, WindowHandle};

/// Frames smaller than this are treated as capture failures.
pub const MIN_CAPTURE_WIDTH: u32 = 300;
pub const MIN_CAPTURE_HEIGHT: u32 = 200;

/// Grabs the pixels the OCR pass reads.
pub struct FrameCapture<'a> {
    desktop: &'a dyn Desktop,
}

impl<'a> FrameCapture<'a> {
    pub fn new(desktop: &'a dyn Desktop) -> Self {
        Self { desktop }
    }

    /// Captures the client area of `window`, or the primary display when no
    /// window is given.
    ///
    /// Returns `None` on any failure; the caller skips the tick.
    pub fn capture(&self, window: Option<&WindowHandle>) -> Option<RgbaImage> {
        let result = match window {
            Some(handle) => {
                debug!(
                    "Capturing window \"{}\" ({}x{} at {}, {})",
                    handle.title,
                    handle.bounding_rect.width,
                    handle.bounding_rect.height,
                    handle.bounding_rect.left,
                    handle.bounding_rect.top
                );
                self.desktop.capture_window(handle)
            }
            None => {
                debug!("Capturing full screen");
                self.desktop.capture_screen()
            }
        };

        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Capture failed: {:#}", e);
                return None;
            }
        };

        if frame.width() < MIN_CAPTURE_WIDTH || frame.height() < MIN_CAPTURE_HEIGHT {
            warn!(
                "Captured frame too small: {}x{} (minimum {}x{})",
                frame.width(),
                frame.height(),
                MIN_CAPTURE_WIDTH,
                MIN_CAPTURE_HEIGHT
            );
            return None;
        }

        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::FakeDesktop;
    use crate::capture::{Rect, WindowId};

    fn handle() -> WindowHandle {
        WindowHandle {
            id: WindowId(3),
            title: "SquadGame".to_string(),
            process_id: 42,
            bounding_rect: Rect::from_edges(0, 0, 1920, 1080),
        }
    }

    #[test]
    fn test_window_capture_uses_window() {
        let desktop = FakeDesktop::new();
        let frame = FrameCapture::new(&desktop).capture(Some(&handle()));

        assert_eq!(frame.unwrap().dimensions(), (800, 600));
        assert_eq!(*desktop.window_captures.lock().unwrap(), 1);
        assert_eq!(*desktop.screen_captures.lock().unwrap(), 0);
    }

    #[test]
    fn test_no_window_captures_screen() {
        let desktop = FakeDesktop::new();
        let frame = FrameCapture::new(&desktop).capture(None);

        assert!(frame.is_some());
        assert_eq!(*desktop.screen_captures.lock().unwrap(), 1);
    }

    #[test]
    fn test_small_frame_is_rejected() {
        let desktop = FakeDesktop::new();
        desktop.push_capture(Ok(RgbaImage::new(300, 199)));
        assert!(FrameCapture::new(&desktop).capture(None).is_none());

        desktop.push_capture(Ok(RgbaImage::new(300, 200)));
        assert!(FrameCapture::new(&desktop).capture(None).is_some());
    }

    #[test]
    fn test_capture_error_yields_none() {
        let desktop = FakeDesktop::new();
        desktop.push_capture(Err("window closed".to_string()));
        assert!(FrameCapture::new(&desktop).capture(Some(&handle())).is_none());
    }
}
