//! Queue-exit notification.

use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{AlertConfig, SharedConfig};

/// Receives the queue-to-game transition. Must return promptly.
pub trait Notifier: Send + Sync {
    fn notify_entered(&self);
}

/// Logs the transition without making a sound.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_entered(&self) {
        info!("Entered the game (alerts disabled)");
    }
}

/// Plays the alert sequence on a detached thread. Reads the `alerts` section
/// of the active configuration on every call, so reloads apply immediately.
pub struct AlertNotifier {
    config: SharedConfig,
}

impl AlertNotifier {
    pub fn new(config: SharedConfig) -> Self {
        Self { config }
    }
}

impl Notifier for AlertNotifier {
    fn notify_entered(&self) {
        let alerts = self.config.snapshot().alerts.clone();
        if !alerts.enabled {
            LogNotifier.notify_entered();
            return;
        }

        info!("Entered the game, playing alert");
        let spawned = thread::Builder::new()
            .name("alert".to_string())
            .spawn(move || {
                show_toast();
                play_sequence(&alerts);
            });
        if let Err(e) = spawned {
            warn!("Failed to start alert thread: {}", e);
        }
    }
}

const TOAST_TITLE: &str = "Squad Queue Monitor";
const TOAST_BODY: &str = "Entered the server";

/// Shell-registered app id that unpackaged desktop apps may post toasts under.
#[cfg(windows)]
const TOAST_APP_ID: &str =
    r"{1AC14E77-02E7-4E5D-B744-2EB1AE5198B7}\WindowsPowerShell\v1.0\powershell.exe";

/// Toast payload with a title line and a body line.
fn toast_xml(title: &str, body: &str) -> String {
    format!(
        "<toast duration=\"long\"><visual><binding template=\"ToastGeneric\">\
         <text>{}</text><text>{}</text></binding></visual></toast>",
        escape_xml(title),
        escape_xml(body)
    )
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(windows)]
fn show_toast() {
    use windows::core::HSTRING;
    use windows::Data::Xml::Dom::XmlDocument;
    use windows::UI::Notifications::{ToastNotification, ToastNotificationManager};

    let result = (|| -> windows::core::Result<()> {
        let xml = XmlDocument::new()?;
        xml.LoadXml(&HSTRING::from(toast_xml(TOAST_TITLE, TOAST_BODY)))?;
        let toast = ToastNotification::CreateToastNotification(&xml)?;
        ToastNotificationManager::CreateToastNotifierWithId(&HSTRING::from(TOAST_APP_ID))?
            .Show(&toast)
    })();
    if let Err(e) = result {
        warn!("Toast notification failed: {}", e);
    }
}

#[cfg(not(windows))]
fn show_toast() {
    info!("{}: {}", TOAST_TITLE, TOAST_BODY);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sound {
    Exclamation,
    Hand,
}

/// One exclamation sound, then `repeat` hand sounds `gap_ms` apart.
fn play_sequence(alerts: &AlertConfig) {
    play(Sound::Exclamation);
    for _ in 0..alerts.repeat {
        thread::sleep(Duration::from_millis(alerts.gap_ms));
        play(Sound::Hand);
    }
}

#[cfg(windows)]
fn play(sound: Sound) {
    use windows::Win32::System::Diagnostics::Debug::MessageBeep;
    use windows::Win32::UI::WindowsAndMessaging::{MB_ICONEXCLAMATION, MB_ICONHAND};

    let style = match sound {
        Sound::Exclamation => MB_ICONEXCLAMATION,
        Sound::Hand => MB_ICONHAND,
    };
    if let Err(e) = unsafe { MessageBeep(style) } {
        warn!("MessageBeep failed: {}", e);
    }
}

#[cfg(not(windows))]
fn play(_sound: Sound) {
    use std::io::Write;

    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(b"\x07");
    let _ = stdout.flush();
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use std::time::Instant;

    #[test]
    fn test_notify_returns_immediately() {
        let mut config = MonitorConfig::default();
        config.alerts.repeat = 2;
        config.alerts.gap_ms = 500;
        let notifier = AlertNotifier::new(SharedConfig::new(config).unwrap());

        let start = Instant::now();
        notifier.notify_entered();
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_toast_xml_has_title_and_body() {
        let xml = toast_xml(TOAST_TITLE, "Queue <done> & in");
        assert!(xml.starts_with("<toast"));
        assert!(xml.contains("<text>Squad Queue Monitor</text>"));
        assert!(xml.contains("<text>Queue &lt;done&gt; &amp; in</text>"));
    }

    #[test]
    fn test_disabled_alerts_only_log() {
        let mut config = MonitorConfig::default();
        config.alerts.enabled = false;
        let notifier = AlertNotifier::new(SharedConfig::new(config).unwrap());
        notifier.notify_entered();
    }
}
