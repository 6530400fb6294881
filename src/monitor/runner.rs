//! Monitor runner: owns the polling worker thread.
//!
//! The controller talks to the worker only through the per-run flag and the
//! wake channel; the worker publishes results to the [`StatusBoard`].

use anyhow::{anyhow, Result};
use chrono::Local;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::pipeline::{read_frame, resolve_source};
use super::state::{next_display, DisplayStatus, MonitorState, Transition};
use super::status::{StatusBoard, StatusSnapshot};
use crate::capture::Desktop;
use crate::config::{MonitorConfig, SharedConfig};
use crate::diagnostics::DebugSink;
use crate::logging::panic_message;
use crate::notify::Notifier;
use crate::ocr::{OcrEngine, TextAnalyzer};

/// External collaborators of the polling loop.
#[derive(Clone)]
pub struct Services {
    pub desktop: Arc<dyn Desktop>,
    pub ocr: Arc<dyn OcrEngine>,
    pub notifier: Arc<dyn Notifier>,
    pub debug_sink: Arc<dyn DebugSink>,
}

struct RunHandle {
    flag: Arc<AtomicBool>,
    wake: Sender<()>,
    thread: JoinHandle<()>,
}

/// Start/stop controller for the background polling loop.
pub struct QueueMonitor {
    services: Services,
    config: SharedConfig,
    board: Arc<StatusBoard>,
    active: Mutex<Option<RunHandle>>,
    /// Stopped workers that may still be finishing a tick
    retired: Mutex<Vec<JoinHandle<()>>>,
}

impl QueueMonitor {
    pub fn new(services: Services, config: SharedConfig) -> Self {
        Self {
            services,
            config,
            board: Arc::new(StatusBoard::new()),
            active: Mutex::new(None),
            retired: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn status(&self) -> StatusSnapshot {
        self.board.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|run| run.flag.load(Ordering::SeqCst))
    }

    /// Starts a new run. Returns `Ok(false)` when a run is already active.
    ///
    /// Waits for workers of earlier runs that are still finishing a tick, so
    /// at most one capture pass is in flight.
    pub fn start(&self) -> Result<bool> {
        let mut active = self.lock_active();
        if active.is_some() {
            warn!("Monitoring is already running");
            return Ok(false);
        }
        self.join_retired();

        let flag = Arc::new(AtomicBool::new(true));
        let (wake_tx, wake_rx) = mpsc::channel();
        let generation = self.board.begin_run();

        let worker = Worker {
            services: self.services.clone(),
            config: self.config.clone(),
            board: Arc::clone(&self.board),
            generation,
            flag: Arc::clone(&flag),
            wake: wake_rx,
            state: MonitorState::new(),
            display: DisplayStatus::Running,
            analyzer: None,
        };

        let thread = match thread::Builder::new()
            .name("queue-monitor".to_string())
            .spawn(move || worker.run())
        {
            Ok(thread) => thread,
            Err(e) => {
                self.board.end_run();
                return Err(anyhow!("Failed to start monitor thread: {}", e));
            }
        };

        *active = Some(RunHandle {
            flag,
            wake: wake_tx,
            thread,
        });
        info!("Monitoring started");
        Ok(true)
    }

    /// Stops the active run without waiting for an in-flight tick.
    /// Returns false when nothing was running.
    pub fn stop(&self) -> bool {
        let Some(run) = self.lock_active().take() else {
            return false;
        };

        run.flag.store(false, Ordering::SeqCst);
        let _ = run.wake.send(());
        self.board.end_run();
        self.retired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(run.thread);
        info!("Monitoring stopped");
        true
    }

    /// Stops the active run and waits for every worker to exit.
    pub fn shutdown(&self) {
        self.stop();
        self.join_retired();
    }

    fn join_retired(&self) {
        let workers: Vec<JoinHandle<()>> = self
            .retired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        if workers.iter().any(|w| !w.is_finished()) {
            info!("Waiting for the current tick to finish...");
        }
        for worker in workers {
            if worker.join().is_err() {
                error!("Monitor thread exited with a panic");
            }
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<RunHandle>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for QueueMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Per-run polling loop, owned by the worker thread.
struct Worker {
    services: Services,
    config: SharedConfig,
    board: Arc<StatusBoard>,
    generation: u64,
    flag: Arc<AtomicBool>,
    wake: Receiver<()>,
    state: MonitorState,
    display: DisplayStatus,
    /// Analyzer built from the snapshot it was compiled for
    analyzer: Option<(Arc<MonitorConfig>, TextAnalyzer)>,
}

impl Worker {
    fn run(mut self) {
        debug!("Monitor thread started (run {})", self.generation);

        while self.flag.load(Ordering::SeqCst) {
            let remaining = self.step();
            match self.wake.recv_timeout(remaining) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!("Monitor thread exiting (run {})", self.generation);
    }

    /// Runs one guarded tick against a fresh configuration snapshot and
    /// returns how long to sleep until the next interval boundary.
    fn step(&mut self) -> Duration {
        let started = Instant::now();
        let config = self.config.snapshot();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.tick(&config)));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };
        if let Some(message) = failure {
            error!("Monitor tick failed: {}", message);
            self.show(DisplayStatus::Error(message));
        }

        remaining_sleep(config.poll_interval_seconds, started.elapsed())
    }

    fn tick(&mut self, config: &Arc<MonitorConfig>) -> Result<()> {
        let desktop = self.services.desktop.as_ref();

        let resolution = resolve_source(desktop, config);
        if self.state.update_locator(&resolution.status) {
            info!("{}", resolution.status);
            let text = resolution.status.to_string();
            self.publish(|s| s.locator = Some(text));
        }

        let Some(frame) = read_frame(
            desktop,
            self.services.ocr.as_ref(),
            resolution.window.as_ref(),
            config,
        ) else {
            debug!("No frame this tick");
            return Ok(());
        };

        if config.debug.save_captures {
            self.services
                .debug_sink
                .save_debug(&frame.original, &frame.processed, &frame.text);
        }

        let (status, signal) = self.analyzer_for(config)?.inspect(&frame.text);
        debug!("Classified as {} ({:?})", status, signal);

        let transition = self.state.observe(&status);
        if transition == Transition::EnteredGame {
            info!("Left the queue, entering the game");
            if self.flag.load(Ordering::SeqCst) {
                self.services.notifier.notify_entered();
            }
        }

        if let Some(display) = next_display(
            &self.display,
            &status,
            transition,
            config.hold_status_when_idle(),
        ) {
            self.display = display;
        }

        let state = self.state.clone();
        let display = self.display.clone();
        self.publish(move |s| {
            s.status = display;
            s.last_position = state.last_position;
            s.last_total = state.last_total;
            s.in_game_detected = state.in_game_detected;
            s.ticks += 1;
            s.last_tick_at = Some(Local::now());
        });
        Ok(())
    }

    fn analyzer_for(&mut self, config: &Arc<MonitorConfig>) -> Result<&TextAnalyzer> {
        let stale = match &self.analyzer {
            Some((built_for, _)) => !Arc::ptr_eq(built_for, config),
            None => true,
        };
        if stale {
            let analyzer = TextAnalyzer::from_config(config)?;
            self.analyzer = Some((Arc::clone(config), analyzer));
        }
        self.analyzer
            .as_ref()
            .map(|(_, analyzer)| analyzer)
            .ok_or_else(|| anyhow!("Text analyzer unavailable"))
    }

    fn show(&mut self, display: DisplayStatus) {
        self.display = display.clone();
        self.publish(move |s| s.status = display);
    }

    fn publish<F>(&self, f: F)
    where
        F: FnOnce(&mut StatusSnapshot),
    {
        // Only the current run may touch the display
        if self.flag.load(Ordering::SeqCst) {
            self.board.update(self.generation, f);
        }
    }
}

/// Time left in the interval after a tick that took `elapsed`.
fn remaining_sleep(interval_seconds: u64, elapsed: Duration) -> Duration {
    Duration::from_secs(interval_seconds).saturating_sub(elapsed)
}
