//! Window discovery and frame capture.
//!
//! This module provides:
//! - The `Desktop` capability trait over OS process/window enumeration and
//!   pixel capture, with a Win32 implementation and a portable fallback
//! - Target resolution rules (`WindowLocator`)
//! - Frame capture with full-screen fallback (`FrameCapture`)

pub mod process;
pub mod screenshot;
pub mod window;

#[cfg(windows)]
mod win32;
#[cfg(not(windows))]
mod portable;

use anyhow::Result;
use image::RgbaImage;
use std::sync::Arc;

pub use screenshot::FrameCapture;
pub use window::{LocatorStatus, Resolution, WindowLocator};

/// Screen-space rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Builds a rect from edge coordinates; inverted edges collapse to zero size.
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            width: (right - left).max(0) as u32,
            height: (bottom - top).max(0) as u32,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// True when strictly larger than `min_width`×`min_height`.
    pub fn exceeds(&self, min_width: u32, min_height: u32) -> bool {
        self.width > min_width && self.height > min_height
    }
}

/// Opaque native window reference. Holds the raw handle value so it can
/// cross thread boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub isize);

/// A visible top-level window as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    pub process_id: u32,
    /// Outer window bounds
    pub rect: Rect,
    pub enabled: bool,
}

/// A resolved capture target. Valid for one resolution cycle only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle {
    pub id: WindowId,
    pub title: String,
    pub process_id: u32,
    pub bounding_rect: Rect,
}

impl From<&WindowInfo> for WindowHandle {
    fn from(info: &WindowInfo) -> Self {
        Self {
            id: info.id,
            title: info.title.clone(),
            process_id: info.process_id,
            bounding_rect: info.rect,
        }
    }
}

/// A running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// OS capabilities the monitor needs. Every call reflects live OS state.
pub trait Desktop: Send + Sync {
    /// Running processes, in ascending pid order.
    fn processes(&self) -> Vec<ProcessInfo>;

    /// Visible top-level windows, in enumeration order.
    fn windows(&self) -> Result<Vec<WindowInfo>>;

    /// Captures the client area of a window.
    fn capture_window(&self, window: &WindowHandle) -> Result<RgbaImage>;

    /// Captures the primary display.
    fn capture_screen(&self) -> Result<RgbaImage>;

    /// Primary display resolution, if known.
    fn screen_size(&self) -> Option<(u32, u32)>;
}

/// Performs one-time platform setup for capture. Call once at startup.
pub fn init_platform() -> Result<()> {
    #[cfg(windows)]
    {
        win32::init()
    }
    #[cfg(not(windows))]
    {
        Ok(())
    }
}

/// Returns the capture backend for the host OS.
pub fn platform_desktop() -> Arc<dyn Desktop> {
    #[cfg(windows)]
    {
        Arc::new(win32::Win32Desktop::new())
    }
    #[cfg(not(windows))]
    {
        Arc::new(portable::PortableDesktop::new())
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted desktop for exercising locator, capture and monitor logic.

    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub struct FakeDesktop {
        pub processes: Mutex<Vec<ProcessInfo>>,
        pub windows: Mutex<Vec<WindowInfo>>,
        /// Capture results in order; an empty queue falls back to `frame_size`
        pub captures: Mutex<VecDeque<Result<RgbaImage, String>>>,
        pub frame_size: (u32, u32),
        pub window_captures: Mutex<u32>,
        pub screen_captures: Mutex<u32>,
    }

    impl FakeDesktop {
        pub fn new() -> Self {
            Self {
                processes: Mutex::new(Vec::new()),
                windows: Mutex::new(Vec::new()),
                captures: Mutex::new(VecDeque::new()),
                frame_size: (800, 600),
                window_captures: Mutex::new(0),
                screen_captures: Mutex::new(0),
            }
        }

        pub fn with_process(self, pid: u32, name: &str) -> Self {
            self.processes.lock().unwrap().push(ProcessInfo {
                pid,
                name: name.to_string(),
            });
            self
        }

        pub fn with_window(self, id: isize, pid: u32, title: &str, width: u32, height: u32) -> Self {
            self.windows.lock().unwrap().push(WindowInfo {
                id: WindowId(id),
                title: title.to_string(),
                process_id: pid,
                rect: Rect {
                    left: 0,
                    top: 0,
                    width,
                    height,
                },
                enabled: true,
            });
            self
        }

        pub fn push_capture(&self, result: Result<RgbaImage, String>) {
            self.captures.lock().unwrap().push_back(result);
        }

        fn next_capture(&self) -> Result<RgbaImage> {
            match self.captures.lock().unwrap().pop_front() {
                Some(Ok(img)) => Ok(img),
                Some(Err(msg)) => Err(anyhow!(msg)),
                None => Ok(RgbaImage::new(self.frame_size.0, self.frame_size.1)),
            }
        }
    }

    impl Desktop for FakeDesktop {
        fn processes(&self) -> Vec<ProcessInfo> {
            self.processes.lock().unwrap().clone()
        }

        fn windows(&self) -> Result<Vec<WindowInfo>> {
            Ok(self.windows.lock().unwrap().clone())
        }

        fn capture_window(&self, _window: &WindowHandle) -> Result<RgbaImage> {
            *self.window_captures.lock().unwrap() += 1;
            self.next_capture()
        }

        fn capture_screen(&self) -> Result<RgbaImage> {
            *self.screen_captures.lock().unwrap() += 1;
            self.next_capture()
        }

        fn screen_size(&self) -> Option<(u32, u32)> {
            Some((1920, 1080))
        }
    }
}
