//! Monitor configuration.
//!
//! Loads settings from config.json next to the executable. The active
//! configuration lives behind a [`SharedConfig`] handle: the polling worker
//! takes one immutable snapshot per tick, and the settings surface replaces
//! the whole snapshot at once after validation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::ocr::validate_pattern;

/// Queue text rendered by the game, e.g. "Position: 12 / 40".
pub const DEFAULT_QUEUE_PATTERN: &str = r"Position:\s*(\d+)\s*/\s*(\d+)";

/// Sample used for the settings dry run. The game always renders it in English.
pub const PATTERN_SAMPLE_TEXT: &str = "Position: 1 / 1";

/// Complete monitor configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between two polls
    pub poll_interval_seconds: u64,
    /// Process name fragment, matched case-insensitively
    pub target_process_name: String,
    /// Window title fragment used when the process is not running
    pub target_window_title: String,
    /// Regex with two capture groups: position and total
    pub queue_pattern: String,
    /// Markers of an active session, matched case-insensitively
    pub in_game_markers: Vec<String>,
    /// Markers of the queue screen, matched case-sensitively
    pub queue_markers: Vec<String>,
    pub ocr: OcrConfig,
    pub preprocess: PreprocessConfig,
    pub debug: DebugConfig,
    pub display: DisplayConfig,
    pub alerts: AlertConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Explicit path to the tesseract executable
    pub tesseract_path: Option<String>,
    /// Explicit tessdata directory
    pub tessdata_dir: Option<String>,
    pub language: String,
    /// Tesseract `--psm` value. 6 assumes a single uniform block of text.
    pub page_segmentation_mode: String,
    /// Upper bound for one recognition call
    pub timeout_seconds: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            tessdata_dir: None,
            language: "eng".to_string(),
            page_segmentation_mode: "6".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Side of the square opening kernel. 1 disables the opening.
    pub open_kernel: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self { open_kernel: 2 }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Save the last captured, processed image and OCR text every tick
    pub save_captures: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Keep the last status text instead of reverting to "running" when
    /// nothing is detected. Unset follows `debug.save_captures`.
    pub hold_status_when_idle: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Play sounds on queue exit. Disabled alerts are only logged.
    pub enabled: bool,
    /// Number of follow-up sounds after the first one
    pub repeat: u32,
    pub gap_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repeat: 3,
            gap_ms: 1000,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 5,
            target_process_name: "SquadGame.exe".to_string(),
            target_window_title: "Squad".to_string(),
            queue_pattern: DEFAULT_QUEUE_PATTERN.to_string(),
            in_game_markers: ["Deploy", "Respawn", "Squad", "Main Menu", "Leave queue"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            queue_markers: vec!["Position:".to_string(), "Leave queue".to_string()],
            ocr: OcrConfig::default(),
            preprocess: PreprocessConfig::default(),
            debug: DebugConfig::default(),
            display: DisplayConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Loads and validates a settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: MonitorConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads settings at startup, falling back to defaults when the file is
    /// missing or rejected.
    pub fn load_or_default(path: &Path) -> Self {
        info!("Looking for config at: {}", path.display());

        if !path.exists() {
            info!("{} not found. Using default config.", path.display());
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                info!("Config loaded from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Rejected {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Checks every field the polling loop relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::InvalidInterval(self.poll_interval_seconds));
        }
        if self.target_process_name.trim().is_empty() {
            return Err(ConfigError::EmptyProcessName);
        }

        let pattern = Regex::new(&self.queue_pattern)?;
        // captures_len counts the implicit whole-match group
        let groups = pattern.captures_len() - 1;
        if groups < 2 {
            return Err(ConfigError::PatternCaptures(groups));
        }

        if self.queue_markers.iter().all(|m| m.is_empty()) {
            return Err(ConfigError::EmptyMarkers);
        }
        if self.ocr.timeout_seconds == 0 {
            return Err(ConfigError::InvalidOcrTimeout);
        }
        Ok(())
    }

    /// Dry-runs the queue pattern on the fixed English sample.
    /// Returns a warning when the pattern does not extract two numbers from it.
    pub fn sample_warning(&self) -> Option<String> {
        let check = validate_pattern(&self.queue_pattern, PATTERN_SAMPLE_TEXT);
        if check.ok && check.position.is_some() && check.total.is_some() {
            None
        } else {
            Some(format!(
                "queue pattern does not extract position/total from \"{}\"",
                PATTERN_SAMPLE_TEXT
            ))
        }
    }

    /// Whether the status display keeps its text on idle ticks.
    pub fn hold_status_when_idle(&self) -> bool {
        self.display
            .hold_status_when_idle
            .unwrap_or(self.debug.save_captures)
    }
}

/// Live-reloadable configuration shared by the controller and the worker.
#[derive(Clone, Debug)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<MonitorConfig>>>,
}

impl SharedConfig {
    /// Wraps an initial configuration, rejecting it if invalid.
    pub fn new(config: MonitorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        })
    }

    /// Returns the active snapshot. The snapshot never changes underneath
    /// the caller.
    pub fn snapshot(&self) -> Arc<MonitorConfig> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Validates and swaps in a new configuration. On error the previous
    /// snapshot stays active.
    pub fn apply(&self, config: MonitorConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(config);
        Ok(())
    }
}
