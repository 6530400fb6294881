//! Two-state queue detector and display rules.

use std::fmt;

use crate::capture::LocatorStatus;
use crate::ocr::QueueStatus;

/// What the status display shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayStatus {
    Stopped,
    Running,
    InQueue { position: u32, total: u32 },
    PositionUnknown,
    Entered,
    /// Transient error from the last tick
    Error(String),
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayStatus::Stopped => write!(f, "Monitoring stopped"),
            DisplayStatus::Running => write!(f, "Monitoring queue status..."),
            DisplayStatus::InQueue { position, total } => {
                write!(f, "In queue: position {} / {}", position, total)
            }
            DisplayStatus::PositionUnknown => write!(f, "In queue: position unknown"),
            DisplayStatus::Entered => write!(f, "Entered the game!"),
            DisplayStatus::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Result of feeding one tick's status into the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    /// Falling edge: the previous tick was in queue, this one is not
    EnteredGame,
}

/// Per-run detector state, owned by the worker thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorState {
    pub was_in_queue: bool,
    /// Sticky for the rest of the run
    pub in_game_detected: bool,
    pub last_position: Option<u32>,
    pub last_total: Option<u32>,
    last_locator: Option<LocatorStatus>,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one classified tick.
    pub fn observe(&mut self, status: &QueueStatus) -> Transition {
        self.last_position = status.position;
        self.last_total = status.total;

        let transition = if self.was_in_queue && !status.in_queue {
            self.in_game_detected = true;
            Transition::EnteredGame
        } else {
            Transition::None
        };

        self.was_in_queue = status.in_queue;
        transition
    }

    /// Records the locator result. Returns true when it differs from the
    /// previous tick's.
    pub fn update_locator(&mut self, status: &LocatorStatus) -> bool {
        if self.last_locator.as_ref() == Some(status) {
            return false;
        }
        self.last_locator = Some(status.clone());
        true
    }
}

/// Computes the display after a tick. `None` keeps the current display.
pub fn next_display(
    current: &DisplayStatus,
    status: &QueueStatus,
    transition: Transition,
    hold_when_idle: bool,
) -> Option<DisplayStatus> {
    if transition == Transition::EnteredGame {
        return Some(DisplayStatus::Entered);
    }

    if status.in_queue {
        return Some(match (status.position, status.total) {
            (Some(position), Some(total)) => DisplayStatus::InQueue { position, total },
            _ => DisplayStatus::PositionUnknown,
        });
    }

    if *current != DisplayStatus::Entered && !hold_when_idle {
        return Some(DisplayStatus::Running);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued() -> QueueStatus {
        QueueStatus::queued(4, 10)
    }

    #[test]
    fn test_falling_edge_fires_once() {
        let mut state = MonitorState::new();
        let sequence = [queued(), queued(), QueueStatus::NOT_IN_QUEUE];
        let transitions: Vec<Transition> = sequence.iter().map(|s| state.observe(s)).collect();

        assert_eq!(
            transitions,
            vec![Transition::None, Transition::None, Transition::EnteredGame]
        );
        assert!(state.in_game_detected);
    }

    #[test]
    fn test_in_game_detected_is_sticky() {
        let mut state = MonitorState::new();
        state.observe(&queued());
        state.observe(&QueueStatus::NOT_IN_QUEUE);
        state.observe(&queued());
        state.observe(&QueueStatus::NOT_IN_QUEUE);
        state.observe(&QueueStatus::NOT_IN_QUEUE);
        assert!(state.in_game_detected);
    }

    #[test]
    fn test_never_queued_never_fires() {
        let mut state = MonitorState::new();
        for _ in 0..3 {
            assert_eq!(state.observe(&QueueStatus::NOT_IN_QUEUE), Transition::None);
        }
        assert!(!state.in_game_detected);
    }

    #[test]
    fn test_last_values_follow_every_tick() {
        let mut state = MonitorState::new();
        state.observe(&QueueStatus::queued(3, 12));
        assert_eq!((state.last_position, state.last_total), (Some(3), Some(12)));
        state.observe(&QueueStatus::queued_unknown());
        assert_eq!((state.last_position, state.last_total), (None, None));
    }

    #[test]
    fn test_locator_updates_are_edge_triggered() {
        let mut state = MonitorState::new();
        let missing = LocatorStatus::ProcessNotFound {
            process: "SquadGame.exe".to_string(),
        };
        let found = LocatorStatus::ProcessFoundNoWindow {
            process: "SquadGame.exe".to_string(),
            pid: 9,
        };

        assert!(state.update_locator(&missing));
        assert!(!state.update_locator(&missing));
        assert!(state.update_locator(&found));
        assert!(!state.update_locator(&found));
        assert!(state.update_locator(&missing));
    }

    #[test]
    fn test_display_rules() {
        let running = DisplayStatus::Running;
        assert_eq!(
            next_display(&running, &QueueStatus::queued(2, 8), Transition::None, false),
            Some(DisplayStatus::InQueue {
                position: 2,
                total: 8
            })
        );
        assert_eq!(
            next_display(&running, &QueueStatus::queued_unknown(), Transition::None, false),
            Some(DisplayStatus::PositionUnknown)
        );
        assert_eq!(
            next_display(
                &running,
                &QueueStatus::NOT_IN_QUEUE,
                Transition::EnteredGame,
                false
            ),
            Some(DisplayStatus::Entered)
        );
    }

    #[test]
    fn test_entered_display_is_kept_when_idle() {
        assert_eq!(
            next_display(
                &DisplayStatus::Entered,
                &QueueStatus::NOT_IN_QUEUE,
                Transition::None,
                false
            ),
            None
        );
    }

    #[test]
    fn test_hold_policy_keeps_queue_display() {
        let current = DisplayStatus::InQueue {
            position: 1,
            total: 5,
        };
        assert_eq!(
            next_display(&current, &QueueStatus::NOT_IN_QUEUE, Transition::None, true),
            None
        );
        assert_eq!(
            next_display(&current, &QueueStatus::NOT_IN_QUEUE, Transition::None, false),
            Some(DisplayStatus::Running)
        );
    }
}
