//! Composable request/response interceptors.
//!
//! Each middleware gets the outbound request and a [`Next`] handle for the
//! rest of the chain, and returns either the response or a typed error. The
//! final link executes the request on the shared `reqwest::Client`.
//! Middlewares never notify or navigate; those side effects are decided by
//! the transport and the session manager from the returned error.

use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Request, Response};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::SessionState;

pub type MiddlewareResult = Result<Response, ApiError>;

pub trait Middleware: Send + Sync {
    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, MiddlewareResult>;
}

/// The remainder of the chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    client: &'a Client,
    chain: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(client: &'a Client, chain: &'a [Arc<dyn Middleware>]) -> Self {
        Self { client, chain }
    }

    pub fn run(self, request: Request) -> BoxFuture<'a, MiddlewareResult> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(
                request,
                Next {
                    client: self.client,
                    chain: rest,
                },
            ),
            None => {
                let client = self.client;
                Box::pin(async move { client.execute(request).await.map_err(ApiError::from) })
            }
        }
    }
}

/// Attaches the current access token as a bearer credential.
///
/// Requests that already carry an `Authorization` header are left alone,
/// which lets logout present the token it captured before teardown.
pub struct BearerAuth {
    state: Arc<SessionState>,
}

impl BearerAuth {
    pub fn new(state: Arc<SessionState>) -> Self {
        Self { state }
    }
}

impl Middleware for BearerAuth {
    fn handle<'a>(&'a self, mut request: Request, next: Next<'a>) -> BoxFuture<'a, MiddlewareResult> {
        if !request.headers().contains_key(AUTHORIZATION) {
            if let Some(token) = self.state.access_token() {
                match HeaderValue::from_str(&format!("Bearer {}", token)) {
                    Ok(mut value) => {
                        value.set_sensitive(true);
                        request.headers_mut().insert(AUTHORIZATION, value);
                    }
                    Err(_) => warn!("Access token is not a valid header value, sending without it"),
                }
            }
        }
        next.run(request)
    }
}

/// Logs method, path, status and latency for every call.
pub struct RequestLog;

impl Middleware for RequestLog {
    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let method = request.method().clone();
            let path = request.url().path().to_string();
            let started = Instant::now();
            let result = next.run(request).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(response) => debug!(
                    %method,
                    path = %path,
                    status = response.status().as_u16(),
                    elapsed_ms,
                    "API request"
                ),
                Err(e) => debug!(%method, path = %path, elapsed_ms, error = %e, "API request failed"),
            }
            result
        })
    }
}

/// Turns non-2xx responses into typed errors.
pub struct StatusCheck;

impl Middleware for StatusCheck {
    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let response = next.run(request).await?;
            if response.status().is_success() {
                return Ok(response);
            }
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        })
    }
}

/// The standard chain, outermost first.
pub fn default_chain(state: Arc<SessionState>) -> Vec<Arc<dyn Middleware>> {
    vec![
        Arc::new(BearerAuth::new(state)),
        Arc::new(RequestLog),
        Arc::new(StatusCheck),
    ]
}
