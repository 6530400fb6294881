//! Queue status extraction from recognized text.
//!
//! The game renders its queue screen in English regardless of the client
//! language, so markers are compared against the raw OCR text as-is.

use regex::Regex;
use std::fmt;

use crate::config::MonitorConfig;
use crate::error::ConfigError;

/// Queue judgement for a single frame.
///
/// `position` and `total` are either both set or both unset, and both are
/// unset whenever `in_queue` is false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatus {
    pub in_queue: bool,
    pub position: Option<u32>,
    pub total: Option<u32>,
}

impl QueueStatus {
    pub const NOT_IN_QUEUE: QueueStatus = QueueStatus {
        in_queue: false,
        position: None,
        total: None,
    };

    /// In queue with a known place.
    pub fn queued(position: u32, total: u32) -> Self {
        Self {
            in_queue: true,
            position: Some(position),
            total: Some(total),
        }
    }

    /// In queue, but the numbers could not be read.
    pub fn queued_unknown() -> Self {
        Self {
            in_queue: true,
            position: None,
            total: None,
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.in_queue, self.position, self.total) {
            (true, Some(position), Some(total)) => write!(f, "in queue ({}/{})", position, total),
            (true, _, _) => write!(f, "in queue (position unknown)"),
            (false, _, _) => write!(f, "not in queue"),
        }
    }
}

/// Which marker class decided the judgement. Informational only: an idle
/// menu and a live session both map to "not in queue".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSignal {
    Empty,
    Queue,
    InGame,
    Idle,
}

/// Maps OCR text to a [`QueueStatus`].
#[derive(Debug, Clone)]
pub struct TextAnalyzer {
    pattern: Regex,
    queue_markers: Vec<String>,
    in_game_markers: Vec<String>,
}

impl TextAnalyzer {
    pub fn new(
        pattern: &str,
        queue_markers: &[String],
        in_game_markers: &[String],
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            queue_markers: queue_markers
                .iter()
                .filter(|m| !m.is_empty())
                .cloned()
                .collect(),
            in_game_markers: in_game_markers
                .iter()
                .filter(|m| !m.is_empty())
                .map(|m| m.to_lowercase())
                .collect(),
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        Self::new(
            &config.queue_pattern,
            &config.queue_markers,
            &config.in_game_markers,
        )
    }

    /// Classifies recognized text.
    pub fn classify(&self, text: &str) -> QueueStatus {
        self.inspect(text).0
    }

    /// Classifies recognized text and reports which markers matched.
    pub fn inspect(&self, text: &str) -> (QueueStatus, TextSignal) {
        if text.is_empty() {
            return (QueueStatus::NOT_IN_QUEUE, TextSignal::Empty);
        }

        let has_queue_marker = self.queue_markers.iter().any(|m| text.contains(m.as_str()));
        if has_queue_marker {
            // A failed number read never downgrades the queue judgement
            let status = self
                .extract_position(text)
                .map(|(position, total)| QueueStatus::queued(position, total))
                .unwrap_or_else(QueueStatus::queued_unknown);
            return (status, TextSignal::Queue);
        }

        let lower = text.to_lowercase();
        if self
            .in_game_markers
            .iter()
            .any(|m| lower.contains(m.as_str()))
        {
            return (QueueStatus::NOT_IN_QUEUE, TextSignal::InGame);
        }

        (QueueStatus::NOT_IN_QUEUE, TextSignal::Idle)
    }

    fn extract_position(&self, text: &str) -> Option<(u32, u32)> {
        let captures = self.pattern.captures(text)?;
        let position = parse_group(captures.get(1))?;
        let total = parse_group(captures.get(2))?;
        Some((position, total))
    }
}

fn parse_group(group: Option<regex::Match<'_>>) -> Option<u32> {
    group?.as_str().trim().parse().ok()
}

/// Result of a settings dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternCheck {
    /// The pattern compiled, matched the sample, and both groups participated
    pub ok: bool,
    pub position: Option<u32>,
    pub total: Option<u32>,
}

/// Dry-runs `pattern` against `sample`. Malformed patterns report `ok = false`.
pub fn validate_pattern(pattern: &str, sample: &str) -> PatternCheck {
    let Ok(regex) = Regex::new(pattern) else {
        return PatternCheck::default();
    };
    let Some(captures) = regex.captures(sample) else {
        return PatternCheck::default();
    };
    match (captures.get(1), captures.get(2)) {
        (Some(position), Some(total)) => PatternCheck {
            ok: true,
            position: position.as_str().trim().parse().ok(),
            total: total.as_str().trim().parse().ok(),
        },
        _ => PatternCheck::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> TextAnalyzer {
        TextAnalyzer::from_config(&MonitorConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_text_is_not_in_queue() {
        assert_eq!(analyzer().classify(""), QueueStatus::NOT_IN_QUEUE);
        assert_eq!(analyzer().inspect("").1, TextSignal::Empty);
    }

    #[test]
    fn test_position_is_extracted() {
        let status = analyzer().classify("Server Browser\nPosition: 3 / 12\n");
        assert_eq!(status, QueueStatus::queued(3, 12));
    }

    #[test]
    fn test_position_with_irregular_spacing() {
        let status = analyzer().classify("Position:3/12");
        assert_eq!(status, QueueStatus::queued(3, 12));
    }

    #[test]
    fn test_marker_without_numbers_is_still_queued() {
        let status = analyzer().classify("Position: abc");
        assert_eq!(status, QueueStatus::queued_unknown());
    }

    #[test]
    fn test_overflowing_number_is_still_queued() {
        let status = analyzer().classify("Position: 99999999999 / 12");
        assert_eq!(status, QueueStatus::queued_unknown());
    }

    #[test]
    fn test_leave_queue_marker_alone() {
        let (status, signal) = analyzer().inspect("LEAVE QUEUE\nLeave queue");
        assert_eq!(status, QueueStatus::queued_unknown());
        assert_eq!(signal, TextSignal::Queue);
    }

    #[test]
    fn test_queue_markers_are_case_sensitive() {
        let (status, signal) = analyzer().inspect("position: 3 / 12");
        assert_eq!(status, QueueStatus::NOT_IN_QUEUE);
        assert_eq!(signal, TextSignal::Idle);
    }

    #[test]
    fn test_in_game_markers() {
        for text in ["Deploy", "Squad Leader", "squad", "RESPAWN in 10"] {
            let (status, signal) = analyzer().inspect(text);
            assert_eq!(status, QueueStatus::NOT_IN_QUEUE, "{}", text);
            assert_eq!(signal, TextSignal::InGame, "{}", text);
        }
    }

    #[test]
    fn test_unrelated_text_is_idle() {
        let (status, signal) = analyzer().inspect("Loading assets...");
        assert_eq!(status, QueueStatus::NOT_IN_QUEUE);
        assert_eq!(signal, TextSignal::Idle);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let analyzer = analyzer();
        let text = "Leave queue Position: 7 / 9";
        assert_eq!(analyzer.classify(text), analyzer.classify(text));
    }

    #[test]
    fn test_queue_then_game_sample() {
        let analyzer = analyzer();
        assert_eq!(
            analyzer.classify("Leave queue   Position: 5 / 20"),
            QueueStatus::queued(5, 20)
        );
        assert_eq!(
            analyzer.classify("Deploy to Main Menu"),
            QueueStatus::NOT_IN_QUEUE
        );
    }

    #[test]
    fn test_validate_pattern() {
        let check = validate_pattern(r"Position:\s*(\d+)\s*/\s*(\d+)", "Position: 1 / 1");
        assert_eq!(
            check,
            PatternCheck {
                ok: true,
                position: Some(1),
                total: Some(1)
            }
        );
    }

    #[test]
    fn test_validate_pattern_malformed() {
        assert!(!validate_pattern(r"Position:\s*(\d+", "Position: 1 / 1").ok);
        assert!(!validate_pattern(r"[", "anything").ok);
    }

    #[test]
    fn test_validate_pattern_missing_group() {
        assert!(!validate_pattern(r"Position:\s*(\d+)", "Position: 1 / 1").ok);
        assert!(!validate_pattern(r"Queue (\d+) of (\d+)", "Position: 1 / 1").ok);
    }
}
