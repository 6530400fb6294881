//! Read-only status board shared between the worker and the controller.

use chrono::{DateTime, Local};
use std::sync::Mutex;

use super::state::DisplayStatus;

/// Everything the display surface shows.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub running: bool,
    /// Locator status text of the latest change
    pub locator: Option<String>,
    pub status: DisplayStatus,
    pub last_position: Option<u32>,
    pub last_total: Option<u32>,
    pub in_game_detected: bool,
    pub ticks: u64,
    pub last_tick_at: Option<DateTime<Local>>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            running: false,
            locator: None,
            status: DisplayStatus::Stopped,
            last_position: None,
            last_total: None,
            in_game_detected: false,
            ticks: 0,
            last_tick_at: None,
        }
    }
}

impl StatusSnapshot {
    /// Multi-line summary for the console `status` command.
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("Monitor: {}", if self.running { "running" } else { "stopped" }),
            format!("Status: {}", self.status),
        ];
        lines.push(format!(
            "Game: {}",
            self.locator.as_deref().unwrap_or("not checked yet")
        ));
        if let (Some(position), Some(total)) = (self.last_position, self.last_total) {
            lines.push(format!("Last position: {} / {}", position, total));
        }
        if self.in_game_detected {
            lines.push("Entered the game during this run".to_string());
        }
        match self.last_tick_at {
            Some(at) => lines.push(format!(
                "Ticks: {} (last at {})",
                self.ticks,
                at.format("%H:%M:%S")
            )),
            None => lines.push(format!("Ticks: {}", self.ticks)),
        }
        lines.join("\n")
    }
}

#[derive(Debug, Default)]
struct Board {
    /// Identifies the run allowed to publish
    generation: u64,
    snapshot: StatusSnapshot,
}

/// Holds the latest [`StatusSnapshot`].
///
/// Each run gets a generation number; writes from a worker whose run has
/// ended are dropped, so a detached worker finishing its last tick cannot
/// overwrite the state of a newer run.
#[derive(Debug, Default)]
pub struct StatusBoard {
    inner: Mutex<Board>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().snapshot.clone()
    }

    /// Resets the board for a new run and returns its generation.
    pub fn begin_run(&self) -> u64 {
        let mut board = self.lock();
        board.generation += 1;
        board.snapshot = StatusSnapshot {
            running: true,
            status: DisplayStatus::Running,
            ..Default::default()
        };
        board.generation
    }

    /// Marks the current run as ended. Later writes from its worker are dropped.
    pub fn end_run(&self) {
        let mut board = self.lock();
        board.generation += 1;
        board.snapshot.running = false;
        board.snapshot.status = DisplayStatus::Stopped;
    }

    /// Applies `f` when `generation` is still current. Returns whether it was applied.
    pub fn update<F>(&self, generation: u64, f: F) -> bool
    where
        F: FnOnce(&mut StatusSnapshot),
    {
        let mut board = self.lock();
        if board.generation != generation {
            return false;
        }
        f(&mut board.snapshot);
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Board> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_generation_is_ignored() {
        let board = StatusBoard::new();
        let first = board.begin_run();
        board.end_run();
        let second = board.begin_run();

        assert!(!board.update(first, |s| s.status = DisplayStatus::Entered));
        assert_eq!(board.snapshot().status, DisplayStatus::Running);

        assert!(board.update(second, |s| s.ticks = 4));
        assert_eq!(board.snapshot().ticks, 4);
    }

    #[test]
    fn test_end_run_marks_stopped() {
        let board = StatusBoard::new();
        let generation = board.begin_run();
        board.update(generation, |s| s.last_position = Some(3));
        board.end_run();

        let snapshot = board.snapshot();
        assert!(!snapshot.running);
        assert_eq!(snapshot.status, DisplayStatus::Stopped);
        // Last values stay readable after stop
        assert_eq!(snapshot.last_position, Some(3));
    }

    #[test]
    fn test_render_mentions_position() {
        let snapshot = StatusSnapshot {
            running: true,
            status: DisplayStatus::InQueue {
                position: 3,
                total: 12,
            },
            last_position: Some(3),
            last_total: Some(12),
            ..Default::default()
        };
        let text = snapshot.render();
        assert!(text.contains("position 3 / 12"));
        assert!(text.contains("Last position: 3 / 12"));
        assert!(text.contains("not checked yet"));
    }
}
