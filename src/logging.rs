//! Log setup: compact console output plus an append-only log file.

use anyhow::Result;
use chrono::Local;
use std::any::Any;
use std::fmt;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::paths;

pub const LOG_FILE_NAME: &str = "squad_queue_monitor.log";

/// Local wall-clock timestamps with milliseconds.
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides `level`.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// whole process.
pub fn init_logging(level: &str) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let file_appender = tracing_appender::rolling::never(paths::get_logs_dir(), LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_timer(LocalTime)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_timer(LocalTime)
                .with_thread_names(true),
        )
        .try_init()?;

    Ok(guard)
}

/// Routes panics into the log with their location.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = panic_message(panic_info.payload());
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        let thread = std::thread::current();
        error!(
            "[PANIC] thread '{}'{}: {}",
            thread.name().unwrap_or("<unnamed>"),
            location,
            msg
        );
    }));
}

/// Text of a panic payload, for `&str` and `String` payloads.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_reads_payloads() {
        let payload = std::panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static text");

        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");

        let payload = std::panic::catch_unwind(|| std::panic::panic_any(42_u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "Unknown panic");
    }
}
