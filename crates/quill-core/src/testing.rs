//! Fakes shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{ApiError, AuthApi, LoginGrant, RefreshGrant};
use crate::auth::{Credentials, PersistedSession, TokenStore, User};
use crate::hooks::{Navigator, Notifier, NotifyKind};

/// Give spawned tasks a chance to run without moving the clock.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    messages: Mutex<Vec<(NotifyKind, String)>>,
}

impl RecordingNotifier {
    pub(crate) fn messages(&self) -> Vec<(NotifyKind, String)> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub(crate) fn count(&self, kind: NotifyKind) -> usize {
        self.messages().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NotifyKind, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((kind, message.to_string()));
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingNavigator {
    redirects: AtomicUsize,
}

impl RecordingNavigator {
    pub(crate) fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to_entry_point(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Store whose writes always fail, like a read-only disk.
pub(crate) struct FailingTokenStore;

impl TokenStore for FailingTokenStore {
    fn load(&self) -> Option<PersistedSession> {
        None
    }

    fn save(&self, _session: &PersistedSession) -> anyhow::Result<()> {
        anyhow::bail!("session storage is read-only")
    }

    fn clear(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

enum RefreshBehavior {
    Succeed,
    Fail(ApiError),
    Hang,
    Panic,
}

/// In-process stand-in for the auth endpoints.
///
/// Login accepts `admin` / `123456`. Each successful refresh hands out
/// `access-N` where N counts from 2, so the first refresh yields `access-2`.
pub(crate) struct FakeAuthApi {
    login_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    refresh_delay: Duration,
    refresh_behavior: RefreshBehavior,
    expires_in: Option<u64>,
    logout_error: Option<ApiError>,
}

impl FakeAuthApi {
    pub(crate) fn new() -> Self {
        Self {
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            refresh_delay: Duration::ZERO,
            refresh_behavior: RefreshBehavior::Succeed,
            expires_in: Some(3600),
            logout_error: None,
        }
    }

    pub(crate) fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub(crate) fn failing_refresh(mut self, error: ApiError) -> Self {
        self.refresh_behavior = RefreshBehavior::Fail(error);
        self
    }

    pub(crate) fn hanging_refresh(mut self) -> Self {
        self.refresh_behavior = RefreshBehavior::Hang;
        self
    }

    pub(crate) fn panicking_refresh(mut self) -> Self {
        self.refresh_behavior = RefreshBehavior::Panic;
        self
    }

    /// Lifetime the fake reports for issued tokens; `None` omits it.
    pub(crate) fn with_expires_in(mut self, expires_in: Option<u64>) -> Self {
        self.expires_in = expires_in;
        self
    }

    pub(crate) fn failing_logout(mut self, error: ApiError) -> Self {
        self.logout_error = Some(error);
        self
    }

    pub(crate) fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if credentials.account != "admin" || credentials.password != "123456" {
            return Err(ApiError::Business {
                code: 4003,
                message: "Invalid account or password".to_string(),
                timestamp: String::new(),
            });
        }
        Ok(LoginGrant {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_in: self.expires_in,
            user: User {
                id: "1".to_string(),
                name: credentials.account.clone(),
                roles: Vec::new(),
            },
            roles: vec!["admin".to_string()],
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshGrant, ApiError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        match &self.refresh_behavior {
            RefreshBehavior::Succeed => Ok(RefreshGrant {
                access_token: format!("access-{}", n + 1),
                refresh_token: Some(format!("refresh-{}", n + 1)),
                expires_in: self.expires_in,
            }),
            RefreshBehavior::Fail(error) => Err(error.clone()),
            RefreshBehavior::Hang => std::future::pending().await,
            RefreshBehavior::Panic => panic!("refresh backend crashed"),
        }
    }

    async fn logout(&self, _access_token: &str) -> Result<(), ApiError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        match &self.logout_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
