//! Squad Queue Monitor
//!
//! Watches the Squad game client while it waits in a server queue. Every few
//! seconds it captures the game window, reads the queue text with Tesseract
//! OCR, and plays an alert once the queue screen is gone and the game has
//! started loading.

mod capture;
mod config;
mod console;
mod diagnostics;
mod error;
mod logging;
mod monitor;
mod notify;
mod ocr;
mod paths;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use capture::process::list_processes;
use config::{MonitorConfig, SharedConfig, PATTERN_SAMPLE_TEXT};
use console::{spawn_config_watcher, Console};
use diagnostics::{run_diagnostic, DirectoryDebugSink};
use monitor::{QueueMonitor, Services};
use notify::AlertNotifier;
use ocr::{validate_pattern, TesseractEngine, TextAnalyzer};

/// Minimum size for the `windows` listing.
const LISTED_WINDOW_MIN_SIZE: u32 = 50;

#[derive(Parser, Debug)]
#[command(name = "squad-queue-monitor", version)]
#[command(about = "Alerts you when the Squad server queue lets you in")]
struct Cli {
    /// Settings file (defaults to config.json next to the executable)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start monitoring and accept console commands (default)
    Run,
    /// Capture and classify once, saving the intermediate images
    Diagnose {
        /// Output directory for test_capture.png, test_processed.png and test_text.txt
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Dry-run a queue pattern against sample text
    TestPattern {
        /// Pattern to test (defaults to the configured one)
        #[arg(long)]
        pattern: Option<String>,
        #[arg(long, default_value = PATTERN_SAMPLE_TEXT)]
        sample: String,
    },
    /// List running processes
    Processes {
        /// Case-insensitive name filter
        #[arg(long)]
        filter: Option<String>,
    },
    /// List visible titled windows
    Windows,
    /// Manage the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write the default settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective settings
    Show,
    /// Validate the settings file
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    paths::ensure_directories()?;
    let _log_guard = logging::init_logging(&cli.log_level)?;
    logging::install_panic_hook();

    capture::init_platform()?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(paths::get_default_config_path);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_monitor(&config_path),
        Commands::Diagnose { out } => diagnose(&config_path, &out),
        Commands::TestPattern { pattern, sample } => test_pattern(&config_path, pattern, &sample),
        Commands::Processes { filter } => {
            print_processes(filter.as_deref());
            Ok(())
        }
        Commands::Windows => print_windows(),
        Commands::Config { action } => config_command(&config_path, action),
    }
}

fn run_monitor(config_path: &Path) -> Result<()> {
    info!("Squad Queue Monitor v{}", env!("CARGO_PKG_VERSION"));

    let loaded = MonitorConfig::load_or_default(config_path);
    if let Some(warning) = loaded.sample_warning() {
        warn!("{}", warning);
    }
    let shared = SharedConfig::new(loaded)?;
    let snapshot = shared.snapshot();

    let ocr = TesseractEngine::from_config(&snapshot.ocr);
    info!("Using Tesseract at {}", ocr.executable().display());

    let services = Services {
        desktop: capture::platform_desktop(),
        ocr: Arc::new(ocr),
        notifier: Arc::new(AlertNotifier::new(shared.clone())),
        debug_sink: Arc::new(DirectoryDebugSink::new(paths::get_debug_dir())),
    };
    let monitor = Arc::new(QueueMonitor::new(services, shared.clone()));

    let stop_watcher = Arc::new(AtomicBool::new(false));
    let watcher = spawn_config_watcher(
        shared,
        config_path.to_path_buf(),
        Arc::clone(&stop_watcher),
    )?;

    monitor.start()?;

    let console = Console::new(Arc::clone(&monitor), config_path.to_path_buf());
    let quit = console.run(io::stdin().lock(), &mut io::stdout())?;

    if !quit {
        info!("Console input closed; monitoring continues until the process is terminated");
        while monitor.is_running() {
            thread::sleep(Duration::from_secs(1));
        }
    }

    monitor.shutdown();
    stop_watcher.store(true, Ordering::SeqCst);
    let _ = watcher.join();
    info!("Exiting");
    Ok(())
}

fn diagnose(config_path: &Path, out: &Path) -> Result<()> {
    let config = MonitorConfig::load_or_default(config_path);
    let desktop = capture::platform_desktop();
    let ocr = TesseractEngine::from_config(&config.ocr);

    let report = run_diagnostic(desktop.as_ref(), &ocr, &config, out)?;
    println!("{}", report.render());
    Ok(())
}

fn test_pattern(config_path: &Path, pattern: Option<String>, sample: &str) -> Result<()> {
    let config = MonitorConfig::load_or_default(config_path);
    let pattern = pattern.unwrap_or_else(|| config.queue_pattern.clone());

    let check = validate_pattern(&pattern, sample);
    println!("Pattern: {}", pattern);
    println!("Sample:  {}", sample);
    match (check.ok, check.position, check.total) {
        (true, Some(position), Some(total)) => {
            println!("OK: position {} / total {}", position, total);
            let analyzer =
                TextAnalyzer::new(&pattern, &config.queue_markers, &config.in_game_markers)?;
            println!("Classified as: {}", analyzer.classify(sample));
            Ok(())
        }
        _ => bail!("pattern does not extract position and total from the sample"),
    }
}

fn print_processes(filter: Option<&str>) {
    let needle = filter.map(|f| f.to_lowercase());
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for process in list_processes() {
        if let Some(needle) = &needle {
            if !process.name.to_lowercase().contains(needle) {
                continue;
            }
        }
        let _ = writeln!(out, "{:>8}  {}", process.pid, process.name);
    }
}

fn print_windows() -> Result<()> {
    let desktop = capture::platform_desktop();
    let windows = desktop.windows()?;
    let listed: Vec<_> = windows
        .iter()
        .filter(|w| !w.title.is_empty())
        .filter(|w| w.rect.exceeds(LISTED_WINDOW_MIN_SIZE, LISTED_WINDOW_MIN_SIZE))
        .collect();

    if listed.is_empty() {
        println!("No visible windows found");
        return Ok(());
    }
    for w in listed {
        println!(
            "{:>8}  {:>5}x{:<5}  {}",
            w.process_id, w.rect.width, w.rect.height, w.title
        );
    }
    Ok(())
}

fn config_command(config_path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            MonitorConfig::default().save(config_path)?;
            println!("Wrote default settings to {}", config_path.display());
        }
        ConfigAction::Show => {
            let config = MonitorConfig::load_or_default(config_path);
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Check => {
            let config = MonitorConfig::load(config_path)?;
            if let Some(warning) = config.sample_warning() {
                println!("Warning: {}", warning);
            }
            println!("{} is valid", config_path.display());
        }
    }
    Ok(())
}
