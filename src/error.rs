use thiserror::Error;

/// Rejections raised at the settings boundary. None of these ever reach the
/// polling loop: the loop keeps running on the last valid snapshot.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("poll interval must be a positive number of seconds (got {0})")]
    InvalidInterval(u64),

    #[error("target process name must not be empty")]
    EmptyProcessName,

    #[error("invalid queue pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("queue pattern must have at least two capture groups (position, total), found {0}")]
    PatternCaptures(usize),

    #[error("at least one queue marker is required")]
    EmptyMarkers,

    #[error("OCR timeout must be at least one second")]
    InvalidOcrTimeout,

    #[error("failed to read or write settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings file: {0}")]
    Parse(#[from] serde_json::Error),
}
