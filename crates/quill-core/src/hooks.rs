//! Display-layer collaborators the core calls into.
//!
//! Both hooks are one-way: implementations must return quickly and must not
//! panic. The core never waits on them and never inspects a result.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Success,
    Error,
    Warning,
    Info,
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NotifyKind::Success => "success",
            NotifyKind::Error => "error",
            NotifyKind::Warning => "warning",
            NotifyKind::Info => "info",
        };
        f.write_str(label)
    }
}

/// Fire-and-forget sink for user-visible messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NotifyKind, message: &str);
}

/// Invoked when the session is gone and the user has to start over.
pub trait Navigator: Send + Sync {
    fn redirect_to_entry_point(&self);
}

/// Notifier that forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NotifyKind, message: &str) {
        match kind {
            NotifyKind::Success | NotifyKind::Info => info!(%kind, "{}", message),
            NotifyKind::Warning => warn!(%kind, "{}", message),
            NotifyKind::Error => error!(%kind, "{}", message),
        }
    }
}

/// Navigator for embedders without a navigation surface.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect_to_entry_point(&self) {}
}

/// The pair of hooks handed to the session manager at construction.
#[derive(Clone)]
pub struct Hooks {
    pub notifier: Arc<dyn Notifier>,
    pub navigator: Arc<dyn Navigator>,
}

impl Hooks {
    pub fn new(notifier: Arc<dyn Notifier>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            notifier,
            navigator,
        }
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self::new(Arc::new(TracingNotifier), Arc::new(NoopNavigator))
    }
}
