//! Desktop-shell boundary. The scheduling core only ever drives these two
//! calls; real notification/tray plumbing lives outside the crate.

use log::info;

/// A user-facing notification for one elapsed slot or a digest of several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotNotification {
    pub title: String,
    pub body: String,
    pub silent: bool,
    /// Slot key a click should open the prompt for, when the notification is
    /// tied to a single slot. The shell reports clicks back through
    /// `Scheduler::notification_clicked`.
    pub slot: Option<String>,
}

/// Implementations must swallow their own failures: a broken notification or
/// focus call degrades silently and never reaches the scheduling loop.
pub trait Shell: Send + Sync {
    fn show_notification(&self, notification: SlotNotification);

    /// Best-effort window raise, used by auto-focus and notification clicks.
    fn bring_window_to_front(&self);
}

/// Default shell that just logs; useful headless and in the binary until a
/// real desktop integration is attached.
pub struct LogShell;

impl Shell for LogShell {
    fn show_notification(&self, notification: SlotNotification) {
        info!(
            "notification: {} — {} (silent={})",
            notification.title, notification.body, notification.silent
        );
    }

    fn bring_window_to_front(&self) {
        info!("bring window to front requested");
    }
}
