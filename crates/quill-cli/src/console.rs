//! Terminal implementations of the core's display hooks.

use quill_core::{Navigator, Notifier, NotifyKind};

/// Prints notifications to stderr so stdout stays clean for payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, kind: NotifyKind, message: &str) {
        let prefix = match kind {
            NotifyKind::Success => "ok",
            NotifyKind::Error => "error",
            NotifyKind::Warning => "warning",
            NotifyKind::Info => "info",
        };
        eprintln!("[{}] {}", prefix, message);
    }
}

/// The CLI has no screens; the entry point is the login command.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn redirect_to_entry_point(&self) {
        eprintln!("Run `quill login` to sign in again.");
    }
}
