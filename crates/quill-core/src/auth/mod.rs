//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionManager`: login, logout, validity checks and session queries
//! - `RefreshCoordinator`: single-flight token refresh with a proactive timer
//! - `SessionState`: the live session, shared read-only with the transport
//! - `TokenStore`: durable session storage (file, OS keyring or memory)
//!
//! Sessions survive restarts through the configured store and are renewed
//! shortly before the access token expires.

pub mod coordinator;
pub mod credentials;
pub mod manager;
pub mod session;
pub mod state;
pub mod store;

pub use coordinator::{RefreshCoordinator, RefreshOutcome};
pub use credentials::KeyringTokenStore;
pub use manager::SessionManager;
pub use session::{AccessGrant, Credentials, PersistedSession, SessionData, User, ADMIN_ROLE};
pub use state::SessionState;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};

#[cfg(test)]
pub(crate) use session::sample_session;
