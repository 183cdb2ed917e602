//! The single chokepoint every API call passes through.
//!
//! Outbound requests run through the middleware chain (bearer token, request
//! log, status check). Inbound bodies are decoded as the server envelope and
//! only the payload reaches the caller. Failures are reported to the
//! notifier here, except `SessionExpired`, whose notification belongs to the
//! session teardown in the session manager.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::envelope::Envelope;
use super::middleware::{default_chain, Middleware, Next};
use super::ApiError;
use crate::auth::SessionState;
use crate::config::Config;
use crate::hooks::{Notifier, NotifyKind};

/// One outbound call, described before it is sent.
#[derive(Clone)]
pub struct ApiCall {
    method: Method,
    path: String,
    body: Option<Value>,
    timeout: Option<Duration>,
    bearer: Option<String>,
    quiet: bool,
    allow_empty: bool,
}

impl ApiCall {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            timeout: None,
            bearer: None,
            quiet: false,
            allow_empty: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post<B: Serialize + ?Sized>(path: impl Into<String>, body: &B) -> Result<Self, ApiError> {
        Self::new(Method::POST, path).json(body)
    }

    pub fn put<B: Serialize + ?Sized>(path: impl Into<String>, body: &B) -> Result<Self, ApiError> {
        Self::new(Method::PUT, path).json(body)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body).map_err(|e| ApiError::Encode(e.to_string()))?);
        Ok(self)
    }

    /// Override the client-wide timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Present this token instead of the session's current one.
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Do not report failures to the notifier; the caller reports them.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Treat a 2xx response with no body (204, empty 200) as a success
    /// carrying a null payload instead of a malformed envelope.
    pub fn allow_empty_body(mut self) -> Self {
        self.allow_empty = true;
        self
    }
}

/// Clone is cheap - reqwest::Client and the chain are reference counted.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    config: Arc<Config>,
    chain: Arc<Vec<Arc<dyn Middleware>>>,
    notifier: Arc<dyn Notifier>,
}

impl Transport {
    /// Transport with the standard middleware chain reading tokens from `state`.
    pub fn new(
        config: &Config,
        state: Arc<SessionState>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ApiError> {
        Self::with_middleware(config, default_chain(state), notifier)
    }

    /// Transport with a caller-assembled chain, outermost first.
    pub fn with_middleware(
        config: &Config,
        chain: Vec<Arc<dyn Middleware>>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self {
            client,
            config: Arc::new(config.clone()),
            chain: Arc::new(chain),
            notifier,
        })
    }

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

    /// Send a call and unwrap the envelope payload.
    pub async fn send<T: DeserializeOwned>(&self, call: ApiCall) -> Result<T, ApiError> {
        let quiet = call.quiet;
        let result = self.execute(call).await;
        if let Err(ref e) = result {
            if !quiet {
                self.report(e);
            }
        }
        result
    }

    async fn execute<T: DeserializeOwned>(&self, call: ApiCall) -> Result<T, ApiError> {
        let url = self.config.endpoint(&call.path);
        let mut builder = self
            .client
            .request(call.method, &url)
            .header(ACCEPT, "application/json");
        if let Some(ref body) = call.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = call.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(ref token) = call.bearer {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::Encode("token is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            builder = builder.header(AUTHORIZATION, value);
        }
        let request = builder.build()?;

        let response = Next::new(&self.client, &self.chain).run(request).await?;
        let body = response.bytes().await?;
        if call.allow_empty && body.iter().all(u8::is_ascii_whitespace) {
            return serde_json::from_value(Value::Null)
                .map_err(|e| ApiError::InvalidResponse(format!("Empty response body: {}", e)));
        }
        let envelope: Envelope = serde_json::from_slice(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response envelope: {}", e)))?;
        envelope.into_result()
    }

    fn report(&self, error: &ApiError) {
        match error {
            ApiError::SessionExpired => {}
            ApiError::NotFound(_) => self.notifier.notify(NotifyKind::Warning, &error.user_message()),
            _ => self.notifier.notify(NotifyKind::Error, &error.user_message()),
        }
    }
}
