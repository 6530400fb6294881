use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "tesseract.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "tesseract";

#[cfg(windows)]
const COMMON_INSTALL_DIRS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR",
    r"C:\Program Files (x86)\Tesseract-OCR",
];
#[cfg(not(windows))]
const COMMON_INSTALL_DIRS: &[&str] = &["/usr/local/bin", "/usr/bin", "/opt/homebrew/bin"];

#[cfg(windows)]
const SYSTEM_TESSDATA_DIRS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tessdata",
    r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
];
#[cfg(not(windows))]
const SYSTEM_TESSDATA_DIRS: &[&str] = &[
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
];

/// Returns the per-user directory for a private Tesseract copy.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("squad-queue-monitor")
        .join("tesseract")
}

/// Finds the Tesseract executable: the configured path first, then the
/// private directory, the system PATH, and common install locations.
pub fn find_tesseract_executable(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = configured {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
        debug!("Configured Tesseract path {} does not exist", p.display());
    }

    let local_exe = get_tesseract_dir().join(EXECUTABLE_NAME);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    // Check PATH
    if let Ok(status) = Command::new("tesseract")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        if status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    for dir in COMMON_INSTALL_DIRS {
        let p = Path::new(dir).join(EXECUTABLE_NAME);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install Tesseract-OCR, add it to PATH, or set ocr.tesseract_path"
    ))
}

/// Finds a tessdata directory that holds `<language>.traineddata`.
///
/// Returns `None` when nothing is found, letting Tesseract use its built-in
/// default location.
pub fn find_tessdata_dir(configured: Option<&str>, language: &str) -> Option<PathBuf> {
    let data_file = format!("{}.traineddata", language);

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(dir) = configured {
        candidates.push(PathBuf::from(dir));
    }
    candidates.push(get_tesseract_dir().join("tessdata"));
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        candidates.push(PathBuf::from(&prefix));
        candidates.push(PathBuf::from(&prefix).join("tessdata"));
    }
    candidates.extend(SYSTEM_TESSDATA_DIRS.iter().map(PathBuf::from));

    candidates.into_iter().find(|dir| dir.join(&data_file).exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_configured_executable_wins() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join(EXECUTABLE_NAME);
        std::fs::write(&exe, b"").unwrap();

        let found = find_tesseract_executable(exe.to_str()).unwrap();
        assert_eq!(found, exe);
    }

    #[test]
    fn test_configured_tessdata_requires_language_file() {
        let dir = tempdir().unwrap();
        let configured = dir.path().to_str().unwrap();

        // Without the language file the configured dir is skipped
        let found = find_tessdata_dir(Some(configured), "zzz_test_lang");
        assert_ne!(found.as_deref(), Some(dir.path()));

        std::fs::write(dir.path().join("zzz_test_lang.traineddata"), b"").unwrap();
        let found = find_tessdata_dir(Some(configured), "zzz_test_lang");
        assert_eq!(found.as_deref(), Some(dir.path()));
    }
}
