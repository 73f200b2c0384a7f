//! System notification sender

use notify_rust::Notification;
use tracing::{info, warn};

/// Fire-and-forget delivery of a titled message.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Desktop notifications through the platform notification service.
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self {
            app_name: "memwatch".to_string(),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) {
        let result = Notification::new()
            .summary(title)
            .body(body)
            .appname(&self.app_name)
            .show();
        if let Err(e) = result {
            warn!("Failed to deliver notification {:?}: {}", title, e);
        }
    }
}

/// Writes notifications to the log instead of the desktop.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!("{}: {}", title, body.replace('\n', "; "));
    }
}
