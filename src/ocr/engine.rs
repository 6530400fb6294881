use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, warn};

use super::setup::{find_tessdata_dir, find_tesseract_executable};
use crate::config::OcrConfig;

/// Text recognition service. Implementations never fail: any internal error
/// is reported as empty text.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, img: &DynamicImage, page_segmentation_mode: &str) -> String;
}

/// Runs the Tesseract command-line executable on a temporary PNG.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
    language: String,
    timeout: Duration,
    /// Where input images and Tesseract output are written
    scratch_dir: PathBuf,
}

/// Removes Tesseract's `{base}.txt` output when dropped, whether the run
/// succeeded, failed or timed out.
struct OutputFile {
    path: PathBuf,
}

impl OutputFile {
    fn for_base(base: &Path) -> Self {
        let mut path = base.as_os_str().to_owned();
        path.push(".txt");
        Self {
            path: PathBuf::from(path),
        }
    }
}

impl Drop for OutputFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl TesseractEngine {
    /// Resolves the executable and language data from the configuration.
    /// A missing installation is logged; recognition then yields empty text.
    pub fn from_config(config: &OcrConfig) -> Self {
        let executable = match find_tesseract_executable(config.tesseract_path.as_deref()) {
            Ok(path) => path,
            Err(e) => {
                warn!("{}", e);
                warn!("OCR will return no text until Tesseract is installed.");
                PathBuf::from("tesseract")
            }
        };
        let tessdata = find_tessdata_dir(config.tessdata_dir.as_deref(), &config.language);

        Self {
            executable,
            tessdata,
            language: config.language.clone(),
            timeout: Duration::from_secs(config.timeout_seconds.max(1)),
            scratch_dir: std::env::temp_dir(),
        }
    }

    pub fn executable(&self) -> &PathBuf {
        &self.executable
    }

    fn run(&self, img: &DynamicImage, page_segmentation_mode: &str) -> Result<String> {
        // Save image to temporary file
        let temp_input = Builder::new()
            .suffix(".png")
            .tempfile_in(&self.scratch_dir)?;
        img.save(temp_input.path())
            .context("Failed to write OCR input image")?;

        // Tesseract appends .txt to the output base
        let temp_output = NamedTempFile::new_in(&self.scratch_dir)?;
        let output = OutputFile::for_base(temp_output.path());

        // Stderr goes to a file so a chatty run cannot fill a pipe and stall
        let temp_stderr = NamedTempFile::new_in(&self.scratch_dir)?;

        let mut command = Command::new(&self.executable);
        command.arg(temp_input.path()).arg(temp_output.path());
        if let Some(tessdata) = &self.tessdata {
            command.arg("--tessdata-dir").arg(tessdata);
        }
        command
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(page_segmentation_mode)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(temp_stderr.reopen()?));

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start {}", self.executable.display()))?;

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if start.elapsed() > self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!(
                    "Tesseract timed out after {}s",
                    self.timeout.as_secs()
                ));
            }
            std::thread::sleep(Duration::from_millis(20));
        };

        if !status.success() {
            let stderr = fs::read_to_string(temp_stderr.path()).unwrap_or_default();
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        fs::read_to_string(&output.path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, img: &DynamicImage, page_segmentation_mode: &str) -> String {
        match self.run(img, page_segmentation_mode) {
            Ok(text) => {
                debug!("OCR returned {} characters", text.len());
                text
            }
            Err(e) => {
                warn!("OCR failed: {:#}", e);
                String::new()
            }
        }
    }
}
