//! Debug captures and the one-shot `diagnose` pass.

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::capture::{Desktop, LocatorStatus};
use crate::config::MonitorConfig;
use crate::monitor::pipeline::{read_frame, resolve_source};
use crate::ocr::{OcrEngine, QueueStatus, TextAnalyzer, TextSignal};

/// Receives the last frame of a tick when debug captures are enabled.
/// Failures are logged, never returned.
pub trait DebugSink: Send + Sync {
    fn save_debug(&self, original: &RgbaImage, processed: &DynamicImage, text: &str);
}

/// Overwrites `debug_screenshot.png`, `debug_processed.png` and
/// `debug_text.txt` in a directory.
pub struct DirectoryDebugSink {
    dir: PathBuf,
}

impl DirectoryDebugSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write_all(&self, original: &RgbaImage, processed: &DynamicImage, text: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        original
            .save(self.dir.join("debug_screenshot.png"))
            .context("Failed to save debug screenshot")?;
        processed
            .save(self.dir.join("debug_processed.png"))
            .context("Failed to save processed image")?;
        fs::write(self.dir.join("debug_text.txt"), text)?;
        Ok(())
    }
}

impl DebugSink for DirectoryDebugSink {
    fn save_debug(&self, original: &RgbaImage, processed: &DynamicImage, text: &str) {
        match self.write_all(original, processed, text) {
            Ok(()) => debug!("Saved debug capture to {}", self.dir.display()),
            Err(e) => warn!("Failed to save debug capture: {:#}", e),
        }
    }
}

/// Result of a `diagnose` run.
#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    pub screen_size: Option<(u32, u32)>,
    pub locator: LocatorStatus,
    pub frame_size: (u32, u32),
    pub text: String,
    pub status: QueueStatus,
    pub signal: TextSignal,
    pub files: Vec<PathBuf>,
}

impl DiagnosticReport {
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        match self.screen_size {
            Some((w, h)) => lines.push(format!("Screen resolution: {}x{}", w, h)),
            None => lines.push("Screen resolution: unknown".to_string()),
        }
        lines.push(format!("Target: {}", self.locator));
        let source = if self.locator.has_window() {
            "game window"
        } else {
            "full screen"
        };
        lines.push(format!("Capture source: {}", source));
        lines.push(format!(
            "Captured frame: {}x{}",
            self.frame_size.0, self.frame_size.1
        ));
        lines.push("--- OCR text ---".to_string());
        lines.push(self.text.trim_end().to_string());
        lines.push("----------------".to_string());
        lines.push(format!("Result: {} ({:?})", self.status, self.signal));
        for file in &self.files {
            lines.push(format!("Saved {}", file.display()));
        }
        lines.join("\n")
    }
}

/// Runs one capture and classify pass, saving `test_capture.png`,
/// `test_processed.png` and `test_text.txt` into `out_dir`.
pub fn run_diagnostic(
    desktop: &dyn Desktop,
    ocr: &dyn OcrEngine,
    config: &MonitorConfig,
    out_dir: &Path,
) -> Result<DiagnosticReport> {
    let screen_size = desktop.screen_size();
    let resolution = resolve_source(desktop, config);
    info!("{}", resolution.status);

    let frame = read_frame(desktop, ocr, resolution.window.as_ref(), config)
        .ok_or_else(|| anyhow!("Capture failed; nothing to analyze"))?;

    let analyzer = TextAnalyzer::from_config(config)?;
    let (status, signal) = analyzer.inspect(&frame.text);

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let capture_path = out_dir.join("test_capture.png");
    let processed_path = out_dir.join("test_processed.png");
    let text_path = out_dir.join("test_text.txt");
    frame.original.save(&capture_path)?;
    frame.processed.save(&processed_path)?;
    fs::write(&text_path, &frame.text)?;

    Ok(DiagnosticReport {
        screen_size,
        locator: resolution.status,
        frame_size: frame.original.dimensions(),
        text: frame.text,
        status,
        signal,
        files: vec![capture_path, processed_path, text_path],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::FakeDesktop;
    use crate::ocr::testing::ScriptedOcr;
    use tempfile::tempdir;

    #[test]
    fn test_directory_sink_writes_three_files() {
        let dir = tempdir().unwrap();
        let sink = DirectoryDebugSink::new(dir.path().join("debug"));
        let original = RgbaImage::new(4, 4);
        let processed = DynamicImage::ImageRgba8(original.clone());

        sink.save_debug(&original, &processed, "Position: 1 / 2");

        let debug_dir = dir.path().join("debug");
        assert!(debug_dir.join("debug_screenshot.png").exists());
        assert!(debug_dir.join("debug_processed.png").exists());
        assert_eq!(
            fs::read_to_string(debug_dir.join("debug_text.txt")).unwrap(),
            "Position: 1 / 2"
        );
    }

    #[test]
    fn test_diagnostic_reports_queue_position() {
        let dir = tempdir().unwrap();
        let desktop = FakeDesktop::new()
            .with_process(42, "SquadGame.exe")
            .with_window(7, 42, "SquadGame", 1280, 720);
        let ocr = ScriptedOcr::new(["Leave queue   Position: 5 / 20"]);

        let report =
            run_diagnostic(&desktop, &ocr, &MonitorConfig::default(), dir.path()).unwrap();

        assert_eq!(report.status, QueueStatus::queued(5, 20));
        assert_eq!(report.signal, TextSignal::Queue);
        assert_eq!(report.screen_size, Some((1920, 1080)));
        assert!(report.locator.has_window());
        assert!(report.files.iter().all(|f| f.exists()));
        assert!(report.render().contains("Screen resolution: 1920x1080"));
    }

    #[test]
    fn test_diagnostic_fails_without_capture() {
        let dir = tempdir().unwrap();
        let desktop = FakeDesktop::new();
        desktop.push_capture(Err("no display".to_string()));
        let ocr = ScriptedOcr::new(Vec::<String>::new());

        assert!(run_diagnostic(&desktop, &ocr, &MonitorConfig::default(), dir.path()).is_err());
        assert!(!dir.path().join("test_capture.png").exists());
    }
}
