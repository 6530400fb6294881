//! Fallback backend for hosts without a supported capture API.
//!
//! Process enumeration works; window listing is empty and pixel capture
//! fails, so every monitor tick skips after locating the process.

use anyhow::{bail, Result};
use image::RgbaImage;

use super::process::list_processes;
use super::{Desktop, ProcessInfo, WindowHandle, WindowInfo};

#[derive(Default)]
pub struct PortableDesktop;

impl PortableDesktop {
    pub fn new() -> Self {
        Self
    }
}

impl Desktop for PortableDesktop {
    fn processes(&self) -> Vec<ProcessInfo> {
        list_processes()
    }

    fn windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(Vec::new())
    }

    fn capture_window(&self, window: &WindowHandle) -> Result<RgbaImage> {
        bail!(
            "Window capture is not supported on this platform (window \"{}\")",
            window.title
        )
    }

    fn capture_screen(&self) -> Result<RgbaImage> {
        bail!("Screen capture is not supported on this platform")
    }

    fn screen_size(&self) -> Option<(u32, u32)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portable_desktop_cannot_capture() {
        let desktop = PortableDesktop::new();
        assert!(desktop.windows().unwrap().is_empty());
        assert!(desktop.capture_screen().is_err());
        assert!(desktop.screen_size().is_none());
    }
}
