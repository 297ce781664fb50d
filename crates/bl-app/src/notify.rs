//! Run notifications. Delivery is best effort.

use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

pub trait Notifier: Send {
    fn notify(&self, message: &str, title: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, title: &str) -> Result<(), NotifyError> {
        info!(title, "{message}");
        Ok(())
    }
}

/// Send and log any failure instead of returning it.
pub fn notify_best_effort(notifier: &dyn Notifier, message: &str, title: &str) {
    if let Err(err) = notifier.notify(message, title) {
        warn!(error = %err, title, "notification dropped");
    }
}
