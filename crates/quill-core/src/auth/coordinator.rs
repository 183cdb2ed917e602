//! Single-flight token refresh with a proactive timer.
//!
//! At most one refresh call is outstanding at any time. Callers that ask
//! for a token while one is in flight join a FIFO queue and all receive the
//! same outcome once it settles. The network call runs on its own task, so
//! a caller dropping its future cannot leave the coordinator stuck in the
//! refreshing state, and the auth timeout bounds how long that state lasts.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::session::AccessGrant;
use super::state::SessionState;
use crate::api::{token_expiry, ApiError, AuthApi};
use crate::config::Config;
use crate::hooks::{Notifier, NotifyKind};

/// What every waiter of one refresh cycle receives: the new access token or
/// the failure.
pub type RefreshOutcome = Result<String, ApiError>;

enum Flight {
    Idle,
    Refreshing(VecDeque<oneshot::Sender<RefreshOutcome>>),
}

/// Settles the current flight with a failure if the refresh task dies
/// (panic or abort) before reaching `settle`, so waiters are never stranded.
struct SettleOnDrop(Option<Arc<RefreshCoordinator>>);

impl SettleOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for SettleOnDrop {
    fn drop(&mut self) {
        if let Some(coordinator) = self.0.take() {
            warn!("Refresh task ended without a result");
            coordinator.settle(Err(ApiError::Network(
                "refresh task ended without a result".to_string(),
            )));
        }
    }
}

pub struct RefreshCoordinator {
    state: Arc<SessionState>,
    api: Arc<dyn AuthApi>,
    notifier: Arc<dyn Notifier>,
    threshold: chrono::Duration,
    fallback_lifetime: chrono::Duration,
    auth_timeout: Duration,
    flight: Mutex<Flight>,
    timer: Mutex<Option<AbortHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RefreshCoordinator {
    pub fn new(
        config: &Config,
        state: Arc<SessionState>,
        api: Arc<dyn AuthApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state,
            api,
            notifier,
            threshold: config.refresh_threshold(),
            fallback_lifetime: config.fallback_token_lifetime(),
            auth_timeout: config.auth_timeout(),
            flight: Mutex::new(Flight::Idle),
            timer: Mutex::new(None),
        })
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*lock(&self.flight), Flight::Refreshing(_))
    }

    pub fn has_pending_timer(&self) -> bool {
        lock(&self.timer)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Get a fresh access token, joining the in-flight refresh if there is one.
    pub async fn refresh(self: &Arc<Self>) -> RefreshOutcome {
        self.join()
            .await
            .unwrap_or_else(|_| Err(ApiError::Network("refresh task ended without a result".to_string())))
    }

    /// Start a refresh (or join the current one) without waiting for it.
    pub fn refresh_in_background(self: &Arc<Self>) {
        drop(self.join());
    }

    /// Queue for the current refresh, starting one if idle. Registration is
    /// synchronous, so callers are queued in the order they arrive.
    fn join(self: &Arc<Self>) -> oneshot::Receiver<RefreshOutcome> {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut flight = lock(&self.flight);
            match &mut *flight {
                Flight::Refreshing(waiters) => {
                    waiters.push_back(tx);
                    false
                }
                Flight::Idle => {
                    *flight = Flight::Refreshing(VecDeque::from([tx]));
                    true
                }
            }
        };

        if start {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let guard = SettleOnDrop(Some(Arc::clone(&this)));
                let outcome = this.run().await;
                guard.disarm();
                let refreshed = outcome.is_ok();
                this.settle(outcome);
                // Re-arm only once idle, so an immediate refresh starts a new cycle
                if refreshed {
                    this.schedule();
                }
            });
        } else {
            debug!("Refresh already in flight, queued");
        }
        rx
    }

    async fn run(self: &Arc<Self>) -> RefreshOutcome {
        let Some((generation, refresh_token)) = self.state.refresh_credentials() else {
            return Err(ApiError::NotLoggedIn);
        };

        info!("Refreshing access token");
        let result = match tokio::time::timeout(self.auth_timeout, self.api.refresh(&refresh_token)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout),
        };

        let result = result.and_then(|grant| {
            let expires_at = token_expiry(grant.expires_in, self.fallback_lifetime)?;
            Ok((grant, expires_at))
        });

        match result {
            Ok((grant, expires_at)) => {
                let access = AccessGrant {
                    token: grant.access_token,
                    expires_at,
                };
                let token = access.token.clone();
                if !self.state.apply_refresh(generation, access, grant.refresh_token) {
                    debug!("Session ended while refreshing, discarding new token");
                    return Err(ApiError::NotLoggedIn);
                }
                info!(
                    expires_in_secs = (expires_at - Utc::now()).num_seconds(),
                    "Access token refreshed"
                );
                Ok(token)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                if self.state.clear_if(generation) {
                    self.cancel_timer();
                    self.notifier
                        .notify(NotifyKind::Warning, &ApiError::SessionExpired.user_message());
                }
                Err(match e {
                    ApiError::Business { message, .. } => ApiError::Authentication(message),
                    ApiError::SessionExpired => {
                        ApiError::Authentication("refresh token rejected".to_string())
                    }
                    other => other,
                })
            }
        }
    }

    /// Release every waiter, in arrival order, with the same outcome.
    fn settle(&self, outcome: RefreshOutcome) {
        let waiters = match std::mem::replace(&mut *lock(&self.flight), Flight::Idle) {
            Flight::Refreshing(waiters) => waiters,
            Flight::Idle => VecDeque::new(),
        };
        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "Refresh settled");
        for waiter in waiters {
            // A waiter that gave up has dropped its receiver.
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Arm the proactive timer for `expires_at - threshold`, replacing any
    /// earlier one. Already inside the threshold means refresh right now.
    pub fn schedule(self: &Arc<Self>) {
        let mut timer = lock(&self.timer);
        if let Some(previous) = timer.take() {
            previous.abort();
        }

        let Some(expires_at) = self.state.expires_at() else {
            return;
        };

        let delay = expires_at
            .checked_sub_signed(self.threshold)
            .and_then(|fire_at| (fire_at - Utc::now()).to_std().ok())
            .unwrap_or(Duration::ZERO);
        if delay.is_zero() {
            drop(timer);
            info!("Access token inside refresh threshold, refreshing now");
            self.refresh_in_background();
            return;
        }

        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(this) = weak.upgrade() {
                debug!("Proactive refresh timer fired");
                let _ = this.refresh().await;
            }
        });
        *timer = Some(handle.abort_handle());
        debug!(delay_secs = delay.as_secs(), "Proactive refresh scheduled");
    }

    pub fn cancel_timer(&self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
            debug!("Proactive refresh timer cancelled");
        }
    }
}
