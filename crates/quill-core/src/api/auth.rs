use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::transport::{ApiCall, Transport};
use super::ApiError;
use crate::auth::{AccessGrant, Credentials, SessionData, User};
use crate::config::Config;

/// Payload of a successful login.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: User,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl LoginGrant {
    /// Build the session this grant describes. Top-level roles, when the
    /// server sends them, replace whatever the user record carried.
    pub fn into_session(self, expires_at: DateTime<Utc>) -> SessionData {
        let mut user = self.user;
        if !self.roles.is_empty() {
            user.roles = self.roles;
        }
        SessionData {
            user,
            access: AccessGrant {
                token: self.access_token,
                expires_at,
            },
            refresh_token: self.refresh_token,
        }
    }
}

impl std::fmt::Debug for LoginGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginGrant")
            .field("expires_in", &self.expires_in)
            .field("user", &self.user)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// Payload of a successful refresh. A missing refresh token means "keep
/// the one you have".
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for RefreshGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGrant")
            .field("rotated", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Absolute expiry for a token issued now. `expires_in` is the server's
/// lifetime in seconds; `fallback` applies when it is absent. A lifetime
/// that cannot be represented is an invalid response, never a panic.
pub fn token_expiry(
    expires_in: Option<u64>,
    fallback: chrono::Duration,
) -> Result<DateTime<Utc>, ApiError> {
    let lifetime = match expires_in {
        Some(secs) => i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| ApiError::InvalidResponse(format!("expiresIn out of range: {}", secs)))?,
        None => fallback,
    };
    Utc::now()
        .checked_add_signed(lifetime)
        .ok_or_else(|| ApiError::InvalidResponse("token expiry out of range".to_string()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// The three authentication endpoints.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, ApiError>;
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, ApiError>;
    /// Close the server-side session for `access_token`.
    async fn logout(&self, access_token: &str) -> Result<(), ApiError>;
}

/// [`AuthApi`] over the shared transport. Every call is quiet: the session
/// manager and refresh coordinator decide what the user is told.
pub struct HttpAuthApi {
    transport: Transport,
    login_path: String,
    refresh_path: String,
    logout_path: String,
    timeout: Duration,
}

impl HttpAuthApi {
    pub fn new(transport: Transport, config: &Config) -> Self {
        Self {
            transport,
            login_path: config.login_path.clone(),
            refresh_path: config.refresh_path.clone(),
            logout_path: config.logout_path.clone(),
            timeout: config.auth_timeout(),
        }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, ApiError> {
        let call = ApiCall::post(self.login_path.as_str(), credentials)?
            .timeout(self.timeout)
            .quiet();
        self.transport.send(call).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, ApiError> {
        let call = ApiCall::post(self.refresh_path.as_str(), &RefreshRequest { refresh_token })?
            .timeout(self.timeout)
            .quiet();
        self.transport.send(call).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        let call = ApiCall::new(reqwest::Method::POST, self.logout_path.as_str())
            .bearer(access_token)
            .timeout(self.timeout)
            .quiet()
            .allow_empty_body();
        // Body is irrelevant; accept whatever the server puts in `data`.
        self.transport.send::<Value>(call).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{sample_session, MemoryTokenStore, SessionState};
    use crate::testing::RecordingNotifier;
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_login_grant_roles_override_user_roles() {
        let json = r#"{
            "accessToken": "a",
            "refreshToken": "r",
            "expiresIn": 3600,
            "user": {"id": 1, "name": "admin", "roles": ["reader"]},
            "roles": ["admin", "editor"]
        }"#;
        let grant: LoginGrant = serde_json::from_str(json).expect("parse");
        assert_eq!(grant.expires_in, Some(3600));
        let session = grant.into_session(Utc::now() + ChronoDuration::hours(1));
        assert_eq!(session.user.roles, vec!["admin", "editor"]);
        assert!(session.is_admin());
    }

    #[test]
    fn test_login_grant_without_roles_or_lifetime() {
        let json = r#"{
            "accessToken": "a",
            "refreshToken": "r",
            "user": {"id": "u-9", "name": "writer", "roles": ["editor"]}
        }"#;
        let grant: LoginGrant = serde_json::from_str(json).expect("parse");
        assert_eq!(grant.expires_in, None);
        let session = grant.into_session(Utc::now());
        assert_eq!(session.user.roles, vec!["editor"]);
        assert!(!session.is_admin());
    }

    #[test]
    fn test_refresh_request_shape() {
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: "r-1",
        })
        .expect("serialize");
        assert_eq!(body, serde_json::json!({"refreshToken": "r-1"}));
    }

    #[test]
    fn test_refresh_grant_optional_fields() {
        let grant: RefreshGrant =
            serde_json::from_str(r#"{"accessToken": "a2", "expiresIn": 900}"#).expect("parse");
        assert_eq!(grant.access_token, "a2");
        assert!(grant.refresh_token.is_none());
        assert_eq!(grant.expires_in, Some(900));
    }

    #[test]
    fn test_token_expiry_uses_lifetime_or_fallback() {
        let before = Utc::now();
        let at = token_expiry(Some(600), ChronoDuration::hours(24)).expect("expiry");
        assert!(at >= before + ChronoDuration::seconds(600));
        assert!(at < before + ChronoDuration::seconds(601));

        let at = token_expiry(None, ChronoDuration::hours(24)).expect("expiry");
        assert!(at >= before + ChronoDuration::hours(24));
    }

    #[test]
    fn test_token_expiry_rejects_unrepresentable_lifetimes() {
        for secs in [10u64.pow(16), u64::MAX, i64::MAX as u64] {
            assert!(matches!(
                token_expiry(Some(secs), ChronoDuration::hours(24)),
                Err(ApiError::InvalidResponse(_))
            ));
        }
        assert!(matches!(
            token_expiry(None, ChronoDuration::MAX),
            Err(ApiError::InvalidResponse(_))
        ));
    }

    fn http_api(server: &MockServer) -> HttpAuthApi {
        let config = Config {
            api_base_url: server.uri(),
            ..Config::default()
        };
        let state = Arc::new(SessionState::hydrate(Box::new(MemoryTokenStore::with_session(
            sample_session(&["admin"], ChronoDuration::hours(1)).to_persisted(),
        ))));
        let transport = Transport::new(&config, state, Arc::new(RecordingNotifier::default()))
            .expect("transport");
        HttpAuthApi::new(transport, &config)
    }

    #[tokio::test]
    async fn test_logout_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .and(header("authorization", "Bearer captured"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let api = http_api(&server);
        assert_eq!(api.logout("captured").await, Ok(()));
    }

    #[tokio::test]
    async fn test_logout_accepts_empty_ok_and_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .and(header("authorization", "Bearer empty"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .and(header("authorization", "Bearer wrapped"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "message": "ok",
                "data": null,
                "timestamp": "2024-05-01T10:00:00Z"
            })))
            .mount(&server)
            .await;

        let api = http_api(&server);
        assert_eq!(api.logout("empty").await, Ok(()));
        assert_eq!(api.logout("wrapped").await, Ok(()));
    }
}
