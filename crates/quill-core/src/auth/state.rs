use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::session::{AccessGrant, SessionData};
use super::store::TokenStore;

struct Slot {
    data: Option<SessionData>,
    /// Bumped on every login and teardown. A refresh started under one
    /// generation may only be applied while that generation is current.
    generation: u64,
}

/// The live session plus its durable store.
///
/// Readers (transport, UI) only get snapshots. Mutation is crate-private and
/// happens through the session manager and the refresh coordinator.
///
/// Store writes happen while the write lock is held, so the durable record
/// always matches the live session even when a login, a refresh and a
/// teardown race. Store calls are short local I/O (one small file or one
/// keychain item).
pub struct SessionState {
    slot: RwLock<Slot>,
    store: Box<dyn TokenStore>,
}

impl SessionState {
    /// Deserialize whatever the store holds. No network, no timers.
    pub fn hydrate(store: Box<dyn TokenStore>) -> Self {
        let data = store.load().map(SessionData::from);
        debug!(has_session = data.is_some(), "Session hydrated");
        Self {
            slot: RwLock::new(Slot {
                data,
                generation: 0,
            }),
            store,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Option<SessionData> {
        self.read().data.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.read().data.is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().data.as_ref().map(|d| d.access.token.clone())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.read().data.as_ref().map(|d| d.access.expires_at)
    }

    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    fn persist(&self, data: &SessionData) {
        if let Err(e) = self.store.save(&data.to_persisted()) {
            warn!(error = %e, "Failed to save refreshed session");
        }
    }

    /// Replace the session wholesale (login). Returns the new generation.
    /// Nothing changes when the record cannot be saved.
    pub(crate) fn install(&self, data: SessionData) -> anyhow::Result<u64> {
        let mut slot = self.write();
        self.store.save(&data.to_persisted())?;
        slot.data = Some(data);
        slot.generation += 1;
        Ok(slot.generation)
    }

    /// The refresh token together with the generation it belongs to.
    pub(crate) fn refresh_credentials(&self) -> Option<(u64, String)> {
        let slot = self.read();
        slot.data
            .as_ref()
            .map(|d| (slot.generation, d.refresh_token.clone()))
    }

    /// Swap in refreshed tokens, leaving the user untouched. Returns false
    /// (and changes nothing) when the session ended or was replaced since
    /// `generation` was read.
    pub(crate) fn apply_refresh(
        &self,
        generation: u64,
        access: AccessGrant,
        refresh_token: Option<String>,
    ) -> bool {
        let mut slot = self.write();
        if slot.generation != generation {
            return false;
        }
        let Some(data) = slot.data.as_mut() else {
            return false;
        };
        data.access = access;
        if let Some(token) = refresh_token {
            data.refresh_token = token;
        }
        let updated = data.clone();
        self.persist(&updated);
        true
    }

    /// Drop the session and erase the durable record.
    pub(crate) fn clear(&self) {
        let mut slot = self.write();
        self.teardown(&mut slot);
    }

    /// Clear only if nothing replaced the session since `generation`.
    pub(crate) fn clear_if(&self, generation: u64) -> bool {
        let mut slot = self.write();
        if slot.generation != generation || slot.data.is_none() {
            return false;
        }
        self.teardown(&mut slot);
        true
    }

    fn teardown(&self, slot: &mut Slot) {
        slot.data = None;
        slot.generation += 1;
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
    }
}
