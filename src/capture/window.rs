//! Target window resolution.
//!
//! The game window is found through its process first. Only when no target
//! process runs is the window title used as a fallback key. When neither
//! resolves, the caller captures the full screen.

use std::fmt;
use tracing::{debug, warn};

use super::process::find_process;
use super::{Desktop, ProcessInfo, WindowHandle, WindowInfo};
use crate::config::MonitorConfig;

/// Minimum outer size of a game window owned by the target process.
pub const GAME_WINDOW_MIN_WIDTH: u32 = 300;
pub const GAME_WINDOW_MIN_HEIGHT: u32 = 200;

/// Minimum outer size of a window matched by title.
pub const TITLE_MATCH_MIN_SIZE: u32 = 100;

/// Outcome of one resolution cycle, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorStatus {
    ProcessAndWindowFound {
        process: String,
        pid: u32,
        title: String,
    },
    ProcessFoundNoWindow {
        process: String,
        pid: u32,
    },
    WindowFoundByTitle {
        title: String,
        pid: u32,
    },
    ProcessNotFound {
        process: String,
    },
}

impl LocatorStatus {
    /// Whether frames come from a specific window rather than the full screen.
    pub fn has_window(&self) -> bool {
        matches!(
            self,
            Self::ProcessAndWindowFound { .. } | Self::WindowFoundByTitle { .. }
        )
    }
}

impl fmt::Display for LocatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessAndWindowFound {
                process,
                pid,
                title,
            } => write!(
                f,
                "Game process {} (PID {}) and window \"{}\" found",
                process, pid, title
            ),
            Self::ProcessFoundNoWindow { process, pid } => write!(
                f,
                "Game process {} (PID {}) found, window not found; using full screen",
                process, pid
            ),
            Self::WindowFoundByTitle { title, pid } => {
                write!(f, "Window \"{}\" (PID {}) found by title", title, pid)
            }
            Self::ProcessNotFound { process } => write!(
                f,
                "Game process {} not found; using full screen",
                process
            ),
        }
    }
}

/// Capture source chosen for a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: LocatorStatus,
    /// `None` means full-screen capture
    pub window: Option<WindowHandle>,
}

/// Resolves the monitored game to a capturable window.
pub struct WindowLocator<'a> {
    desktop: &'a dyn Desktop,
}

impl<'a> WindowLocator<'a> {
    pub fn new(desktop: &'a dyn Desktop) -> Self {
        Self { desktop }
    }

    /// Returns the first process whose name contains `process_name`
    /// (case-insensitive).
    pub fn is_target_running(&self, process_name: &str) -> Option<ProcessInfo> {
        let processes = self.desktop.processes();
        find_process(&processes, process_name).cloned()
    }

    /// Largest visible, enabled window owned by `pid`.
    pub fn find_target_window(&self, pid: u32) -> Option<WindowHandle> {
        let windows = self.enumerate()?;
        select_process_window(&windows, pid).map(WindowHandle::from)
    }

    /// Best visible window whose title contains `title_fragment`.
    pub fn find_window_by_title(&self, title_fragment: &str) -> Option<WindowHandle> {
        let windows = self.enumerate()?;
        select_window_by_title(&windows, title_fragment).map(WindowHandle::from)
    }

    /// Runs the full resolution policy for one tick.
    pub fn resolve(&self, config: &MonitorConfig) -> Resolution {
        if let Some(process) = self.is_target_running(&config.target_process_name) {
            return match self.find_target_window(process.pid) {
                Some(window) => Resolution {
                    status: LocatorStatus::ProcessAndWindowFound {
                        process: process.name,
                        pid: process.pid,
                        title: window.title.clone(),
                    },
                    window: Some(window),
                },
                None => Resolution {
                    status: LocatorStatus::ProcessFoundNoWindow {
                        process: process.name,
                        pid: process.pid,
                    },
                    window: None,
                },
            };
        }

        let by_title = if config.target_window_title.trim().is_empty() {
            None
        } else {
            self.find_window_by_title(&config.target_window_title)
        };

        match by_title {
            Some(window) => Resolution {
                status: LocatorStatus::WindowFoundByTitle {
                    title: window.title.clone(),
                    pid: window.process_id,
                },
                window: Some(window),
            },
            None => Resolution {
                status: LocatorStatus::ProcessNotFound {
                    process: config.target_process_name.clone(),
                },
                window: None,
            },
        }
    }

    fn enumerate(&self) -> Option<Vec<WindowInfo>> {
        match self.desktop.windows() {
            Ok(windows) => {
                debug!("Enumerated {} visible windows", windows.len());
                Some(windows)
            }
            Err(e) => {
                warn!("Window enumeration failed: {}", e);
                None
            }
        }
    }
}

/// Picks the largest enabled window of `pid` above the game-window minimum.
/// Equal areas keep the window enumerated first.
pub fn select_process_window(windows: &[WindowInfo], pid: u32) -> Option<&WindowInfo> {
    windows
        .iter()
        .filter(|w| w.process_id == pid && w.enabled)
        .filter(|w| w.rect.exceeds(GAME_WINDOW_MIN_WIDTH, GAME_WINDOW_MIN_HEIGHT))
        .fold(None, |best: Option<&WindowInfo>, candidate| match best {
            Some(current) if current.rect.area() >= candidate.rect.area() => Some(current),
            _ => Some(candidate),
        })
}

/// Picks a titled window containing `fragment` (case-insensitive): exact
/// title matches first, then the shortest title, then enumeration order.
pub fn select_window_by_title<'w>(windows: &'w [WindowInfo], fragment: &str) -> Option<&'w WindowInfo> {
    let needle = fragment.to_lowercase();
    windows
        .iter()
        .filter(|w| !w.title.is_empty())
        .filter(|w| w.title.to_lowercase().contains(&needle))
        .filter(|w| w.rect.exceeds(TITLE_MATCH_MIN_SIZE, TITLE_MATCH_MIN_SIZE))
        // min_by_key keeps the first of equal keys
        .min_by_key(|w| (w.title.to_lowercase() != needle, w.title.chars().count()))
}
