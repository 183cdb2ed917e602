//! Client core for the quill blog API.
//!
//! Owns the authenticated session: logging in, keeping the access token
//! fresh, persisting the session across restarts, and sending requests
//! through a middleware chain that attaches the bearer token and unwraps the
//! server's response envelope.
//!
//! Display concerns stay outside. The core reports through the
//! [`hooks::Notifier`] and [`hooks::Navigator`] traits supplied by the host.

pub mod api;
pub mod auth;
pub mod config;
pub mod hooks;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiCall, ApiError, ErrorKind, Transport};
pub use auth::{Credentials, SessionManager, User};
pub use config::{Config, StorageKind};
pub use hooks::{Hooks, Navigator, Notifier, NotifyKind};
