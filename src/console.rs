//! Console controller for `run`: reads commands from stdin and watches the
//! settings file for changes.

use anyhow::Result;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::config::{MonitorConfig, SharedConfig};
use crate::error::ConfigError;
use crate::monitor::QueueMonitor;

const WATCH_INTERVAL: Duration = Duration::from_secs(2);

const HELP: &str = "Commands:
  start   start monitoring
  stop    stop monitoring
  status  show the current status
  reload  reload the settings file
  quit    stop monitoring and exit
  help    show this help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Reload,
    Quit,
    Help,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let word = line.trim().to_lowercase();
    match word.as_str() {
        "" => Command::Empty,
        "start" => Command::Start,
        "stop" => Command::Stop,
        "status" | "s" => Command::Status,
        "reload" => Command::Reload,
        "quit" | "exit" | "q" => Command::Quit,
        "help" | "?" => Command::Help,
        _ => Command::Unknown(word),
    }
}

/// Loads `path` and swaps it in. On error the active snapshot is kept.
pub fn reload_config(config: &SharedConfig, path: &Path) -> Result<(), ConfigError> {
    let loaded = MonitorConfig::load(path)?;
    if let Some(warning) = loaded.sample_warning() {
        warn!("{}", warning);
    }
    config.apply(loaded)?;
    info!("Settings reloaded from {}", path.display());
    Ok(())
}

/// Interactive controller around a [`QueueMonitor`].
pub struct Console {
    monitor: Arc<QueueMonitor>,
    config_path: PathBuf,
}

impl Console {
    pub fn new(monitor: Arc<QueueMonitor>, config_path: PathBuf) -> Self {
        Self {
            monitor,
            config_path,
        }
    }

    /// Processes commands until `quit` or end of input. Returns true when the
    /// user asked to quit.
    pub fn run<R: BufRead, W: Write>(&self, input: R, out: &mut W) -> Result<bool> {
        writeln!(out, "Type 'help' for commands.")?;
        for line in input.lines() {
            let line = line?;
            if !self.handle(parse_command(&line), out)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Executes one command. Returns false to exit.
    pub fn handle<W: Write>(&self, command: Command, out: &mut W) -> Result<bool> {
        match command {
            Command::Start => {
                if self.monitor.start()? {
                    writeln!(out, "Monitoring started")?;
                } else {
                    writeln!(out, "Monitoring is already running")?;
                }
            }
            Command::Stop => {
                if self.monitor.stop() {
                    writeln!(out, "Monitoring stopped")?;
                } else {
                    writeln!(out, "Monitoring is not running")?;
                }
            }
            Command::Status => {
                writeln!(out, "{}", self.monitor.status().render())?;
            }
            Command::Reload => match reload_config(self.monitor.config(), &self.config_path) {
                Ok(()) => writeln!(out, "Settings reloaded")?,
                Err(e) => writeln!(out, "Settings rejected: {}", e)?,
            },
            Command::Quit => return Ok(false),
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Empty => {}
            Command::Unknown(word) => {
                writeln!(out, "Unknown command '{}'. Type 'help' for commands.", word)?
            }
        }
        Ok(true)
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Polls the settings file and reloads it whenever its modification time
/// changes. Runs until `stop` is set.
pub fn spawn_config_watcher(
    config: SharedConfig,
    path: PathBuf,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("config-watcher".to_string())
        .spawn(move || {
            let mut last_seen = modified_time(&path);
            debug!("Watching {} for changes", path.display());

            while !stop.load(Ordering::SeqCst) {
                thread::sleep(WATCH_INTERVAL);

                let current = modified_time(&path);
                if current == last_seen {
                    continue;
                }
                last_seen = current;

                if current.is_none() {
                    warn!("{} was removed; keeping current settings", path.display());
                    continue;
                }
                if let Err(e) = reload_config(&config, &path) {
                    warn!("Rejected changed settings file: {}", e);
                }
            }
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::FakeDesktop;
    use crate::diagnostics::DirectoryDebugSink;
    use crate::monitor::Services;
    use crate::notify::testing::CountingNotifier;
    use crate::ocr::testing::ScriptedOcr;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn console(config_path: PathBuf) -> Console {
        let services = Services {
            desktop: Arc::new(FakeDesktop::new()),
            ocr: Arc::new(ScriptedOcr::new(Vec::<String>::new())),
            notifier: Arc::new(CountingNotifier::default()),
            debug_sink: Arc::new(DirectoryDebugSink::new(std::env::temp_dir())),
        };
        let config = SharedConfig::new(MonitorConfig::default()).unwrap();
        Console::new(Arc::new(QueueMonitor::new(services, config)), config_path)
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("  START \n"), Command::Start);
        assert_eq!(parse_command("q"), Command::Quit);
        assert_eq!(parse_command(""), Command::Empty);
        assert_eq!(parse_command("jump"), Command::Unknown("jump".to_string()));
    }

    #[test]
    fn test_session_start_stop_quit() {
        let dir = tempdir().unwrap();
        let console = console(dir.path().join("config.json"));
        let mut out = Vec::new();

        let quit = console
            .run(Cursor::new("start\nstart\nstatus\nstop\nstop\nquit\nstart\n"), &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(quit);
        assert!(text.contains("Monitoring started"));
        assert!(text.contains("already running"));
        assert!(text.contains("Monitoring is not running"));
        // Nothing after quit is processed
        assert!(!console.monitor.is_running());
        console.monitor.shutdown();
    }

    #[test]
    fn test_end_of_input_is_not_quit() {
        let dir = tempdir().unwrap();
        let console = console(dir.path().join("config.json"));
        let mut out = Vec::new();
        assert!(!console.run(Cursor::new("help\n"), &mut out).unwrap());
        assert!(String::from_utf8(out).unwrap().contains("reload"));
    }

    #[test]
    fn test_reload_rejects_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "poll_interval_seconds": 0 }"#).unwrap();

        let console = console(path.clone());
        let mut out = Vec::new();
        console.handle(Command::Reload, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("Settings rejected"));
        assert_eq!(console.monitor.config().snapshot().poll_interval_seconds, 5);

        std::fs::write(&path, r#"{ "poll_interval_seconds": 7 }"#).unwrap();
        let mut out = Vec::new();
        console.handle(Command::Reload, &mut out).unwrap();
        assert_eq!(console.monitor.config().snapshot().poll_interval_seconds, 7);
    }

    #[test]
    fn test_watcher_picks_up_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = SharedConfig::new(MonitorConfig::default()).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_config_watcher(config.clone(), path.clone(), stop.clone()).unwrap();

        MonitorConfig {
            poll_interval_seconds: 11,
            ..Default::default()
        }
        .save(&path)
        .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while config.snapshot().poll_interval_seconds != 11 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(100));
        }
        stop.store(true, Ordering::SeqCst);
        handle.join().unwrap();
        assert_eq!(config.snapshot().poll_interval_seconds, 11);
    }
}
