//! Public surface for login, logout and session queries.
//!
//! A `SessionManager` is built once at startup and handed by reference to
//! everything that needs the API. Construction only reads the persisted
//! record; the bootstrap calls [`SessionManager::resume_session`] to arm the
//! refresh timer, and [`SessionManager::shutdown`] before exiting.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::coordinator::RefreshCoordinator;
use super::session::{Credentials, SessionData, User};
use super::state::SessionState;
use super::store::TokenStore;
use crate::api::{token_expiry, ApiCall, ApiError, AuthApi, HttpAuthApi, Transport};
use crate::config::Config;
use crate::hooks::{Hooks, NotifyKind};

pub struct SessionManager {
    config: Config,
    state: Arc<SessionState>,
    transport: Transport,
    api: Arc<dyn AuthApi>,
    coordinator: Arc<RefreshCoordinator>,
    hooks: Hooks,
}

impl SessionManager {
    /// Manager talking to the configured HTTP endpoints.
    pub fn new(config: Config, store: Box<dyn TokenStore>, hooks: Hooks) -> Result<Self, ApiError> {
        let state = Arc::new(SessionState::hydrate(store));
        let transport = Transport::new(&config, Arc::clone(&state), Arc::clone(&hooks.notifier))?;
        let api = Arc::new(HttpAuthApi::new(transport.clone(), &config));
        Ok(Self::assemble(config, state, transport, api, hooks))
    }

    /// Manager whose login/refresh/logout go through `api` instead of HTTP.
    /// Ordinary requests still use the HTTP transport.
    pub fn with_auth_api(
        config: Config,
        store: Box<dyn TokenStore>,
        hooks: Hooks,
        api: Arc<dyn AuthApi>,
    ) -> Result<Self, ApiError> {
        let state = Arc::new(SessionState::hydrate(store));
        let transport = Transport::new(&config, Arc::clone(&state), Arc::clone(&hooks.notifier))?;
        Ok(Self::assemble(config, state, transport, api, hooks))
    }

    fn assemble(
        config: Config,
        state: Arc<SessionState>,
        transport: Transport,
        api: Arc<dyn AuthApi>,
        hooks: Hooks,
    ) -> Self {
        let coordinator = RefreshCoordinator::new(
            &config,
            Arc::clone(&state),
            Arc::clone(&api),
            Arc::clone(&hooks.notifier),
        );
        Self {
            config,
            state,
            transport,
            api,
            coordinator,
            hooks,
        }
    }

    /// Pick up a rehydrated session: arm the proactive timer, or refresh
    /// right away if the token is already inside the threshold. Returns
    /// whether a session was found.
    pub fn resume_session(&self) -> bool {
        if !self.state.is_logged_in() {
            debug!("No session to resume");
            return false;
        }
        info!("Resuming persisted session");
        self.coordinator.schedule();
        true
    }

    /// Stop background work without touching the session.
    pub fn shutdown(&self) {
        self.coordinator.cancel_timer();
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        info!(account = %credentials.account, "Logging in");
        let result = match tokio::time::timeout(self.config.auth_timeout(), self.api.login(credentials)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout),
        };

        let grant = match result {
            Ok(grant) => grant,
            Err(e) => {
                let e = match e {
                    ApiError::Business { message, .. } => ApiError::Authentication(message),
                    ApiError::SessionExpired => {
                        ApiError::Authentication("invalid credentials".to_string())
                    }
                    other => other,
                };
                warn!(error = %e, "Login failed");
                self.hooks
                    .notifier
                    .notify(NotifyKind::Error, &e.user_message());
                return Err(e);
            }
        };

        let installed = token_expiry(grant.expires_in, self.config.fallback_token_lifetime())
            .and_then(|expires_at| {
                let session = grant.into_session(expires_at);
                let user = session.user.clone();
                self.state
                    .install(session)
                    .map_err(|e| ApiError::Storage(e.to_string()))?;
                Ok(user)
            });
        let user = match installed {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Login accepted but the session could not be established");
                self.hooks
                    .notifier
                    .notify(NotifyKind::Error, &e.user_message());
                return Err(e);
            }
        };
        self.coordinator.schedule();

        info!(user = %user.name, admin = user.is_admin(), "Logged in");
        self.hooks
            .notifier
            .notify(NotifyKind::Success, &format!("Welcome, {}", user.name));
        Ok(user)
    }

    /// End the session. The server call is best effort; local teardown
    /// always happens.
    pub async fn logout(&self) {
        let token = self.state.access_token();
        self.coordinator.cancel_timer();
        self.state.clear();

        if let Some(token) = token {
            match tokio::time::timeout(self.config.auth_timeout(), self.api.logout(&token)).await {
                Ok(Ok(())) => debug!("Server session closed"),
                Ok(Err(e)) => warn!(error = %e, "Server logout failed, local session cleared anyway"),
                Err(_) => warn!("Server logout timed out, local session cleared anyway"),
            }
        }

        info!("Logged out");
        self.hooks
            .notifier
            .notify(NotifyKind::Info, "You have been logged out");
    }

    /// Make sure the access token is usable before a session-gated
    /// operation.
    ///
    /// - no session: `false`
    /// - expired: refresh, and report whether that worked
    /// - inside the renewal window: start a background refresh, `true`
    /// - otherwise: `true`
    pub async fn ensure_valid(&self) -> bool {
        let Some(session) = self.state.snapshot() else {
            return false;
        };
        if session.is_expired() {
            debug!("Access token expired, refreshing before use");
            return self.coordinator.refresh().await.is_ok();
        }
        if session.needs_refresh(self.config.renewal_window()) {
            debug!(
                minutes_left = session.minutes_until_expiry(),
                "Access token close to expiry, renewing in background"
            );
            self.coordinator.refresh_in_background();
        }
        true
    }

    /// Single-flight refresh, for callers that want to force one.
    pub async fn refresh_token(&self) -> Result<String, ApiError> {
        self.coordinator.refresh().await
    }

    /// Re-arm the proactive refresh timer from the current expiry.
    pub fn schedule_token_refresh(&self) {
        self.coordinator.schedule();
    }

    pub fn has_pending_refresh(&self) -> bool {
        self.coordinator.has_pending_timer()
    }

    // ===== Read-only accessors =====

    pub fn session(&self) -> Option<SessionData> {
        self.state.snapshot()
    }

    pub fn user(&self) -> Option<User> {
        self.state.snapshot().map(|s| s.user)
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.is_logged_in()
    }

    pub fn is_admin(&self) -> bool {
        self.state
            .snapshot()
            .map(|s| s.is_admin())
            .unwrap_or(false)
    }

    /// No session counts as expired.
    pub fn is_token_expired(&self) -> bool {
        self.state
            .snapshot()
            .map(|s| s.is_expired())
            .unwrap_or(true)
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.access_token()
    }

    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.state.snapshot().map(|s| s.minutes_until_expiry())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ===== Session-aware requests =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiCall::get(path)).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(ApiCall::post(path, body)?).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(ApiCall::put(path, body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiCall::delete(path)).await
    }

    /// Send through the transport. A logged-in caller gets `ensure_valid`
    /// first; a 401 ends the session and sends the user to the entry point.
    pub async fn send<T: DeserializeOwned>(&self, call: ApiCall) -> Result<T, ApiError> {
        if self.state.is_logged_in() && !self.ensure_valid().await {
            // The coordinator already tore the session down and told the user.
            self.hooks.navigator.redirect_to_entry_point();
            return Err(ApiError::SessionExpired);
        }

        let generation = self.state.generation();
        let result = self.transport.send(call).await;
        if let Err(ApiError::SessionExpired) = result {
            self.end_expired_session(generation);
        }
        result
    }

    /// Tear down after a 401, unless the session the request was sent under
    /// has already been replaced or ended.
    fn end_expired_session(&self, generation: u64) {
        if !self.state.clear_if(generation) && self.state.generation() != generation {
            debug!("Ignoring 401 from a session that has since ended");
            return;
        }
        warn!("Request rejected as unauthorized, ending session");
        self.hooks
            .notifier
            .notify(NotifyKind::Warning, &ApiError::SessionExpired.user_message());
        self.coordinator.cancel_timer();
        self.hooks.navigator.redirect_to_entry_point();
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.coordinator.cancel_timer();
    }
}
