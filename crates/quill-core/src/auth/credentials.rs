use anyhow::{Context, Result};
use keyring::Entry;
use tracing::warn;

use super::session::PersistedSession;
use super::store::TokenStore;

const SERVICE_NAME: &str = "quill";

/// Keychain account under which the session record is kept.
const SESSION_ACCOUNT: &str = "session";

/// Keeps the whole session record as a single OS keychain secret.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, SESSION_ACCOUNT).context("Failed to create keyring entry")
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Option<PersistedSession> {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Keychain unavailable");
                return None;
            }
        };
        let secret = match entry.get_password() {
            Ok(secret) => secret,
            Err(keyring::Error::NoEntry) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to retrieve session from keychain");
                return None;
            }
        };
        match serde_json::from_str(&secret) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable session in keychain");
                None
            }
        }
    }

    fn save(&self, session: &PersistedSession) -> Result<()> {
        let secret = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&secret)
            .context("Failed to store session in keychain")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}
