use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Role name that grants admin rights.
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ADMIN_ROLE)
    }
}

/// Servers disagree on whether ids are numbers or strings.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Login form.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub account: String,
    pub password: String,
}

impl Credentials {
    pub fn new(account: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An access token and the instant it stops being trusted. Always set and
/// cleared as a unit.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGrant")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A populated session. An empty session is `None` at the holder.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionData {
    pub user: User,
    pub access: AccessGrant,
    pub refresh_token: String,
}

impl std::fmt::Debug for SessionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionData")
            .field("user", &self.user)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

impl SessionData {
    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.access.expires_at
    }

    /// True once the remaining lifetime is at or below `window`.
    pub fn needs_refresh(&self, window: Duration) -> bool {
        self.time_until_expiry() <= window
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.access.expires_at - Utc::now()
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }

    pub fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            user: self.user.clone(),
            access_token: self.access.token.clone(),
            refresh_token: self.refresh_token.clone(),
            is_admin: self.is_admin(),
            expires_at: self.access.expires_at,
        }
    }
}

/// On-disk layout of a session. Queues and timers are never part of it.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    /// Written for readers of the raw record; recomputed from roles on load.
    #[serde(default)]
    pub is_admin: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl From<PersistedSession> for SessionData {
    fn from(p: PersistedSession) -> Self {
        SessionData {
            user: p.user,
            access: AccessGrant {
                token: p.access_token,
                expires_at: p.expires_at,
            },
            refresh_token: p.refresh_token,
        }
    }
}

impl std::fmt::Debug for PersistedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedSession")
            .field("user", &self.user)
            .field("is_admin", &self.is_admin)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn sample_session(roles: &[&str], expires_in: Duration) -> SessionData {
    SessionData {
        user: User {
            id: "1".to_string(),
            name: "admin".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        },
        access: AccessGrant {
            token: "access-1".to_string(),
            expires_at: Utc::now() + expires_in,
        },
        refresh_token: "refresh-1".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_admin_follows_roles() {
        let mut session = sample_session(&["editor"], Duration::hours(1));
        assert!(!session.is_admin());
        session.user.roles.push("admin".to_string());
        assert!(session.is_admin());
        assert!(session.to_persisted().is_admin);
    }

    #[test]
    fn test_expiry_predicates() {
        let fresh = sample_session(&[], Duration::hours(1));
        assert!(!fresh.is_expired());
        assert!(!fresh.needs_refresh(Duration::minutes(5)));
        assert!(fresh.minutes_until_expiry() >= 59);

        let closing = sample_session(&[], Duration::minutes(3));
        assert!(!closing.is_expired());
        assert!(closing.needs_refresh(Duration::minutes(5)));

        let stale = sample_session(&[], Duration::minutes(-1));
        assert!(stale.is_expired());
        assert_eq!(stale.minutes_until_expiry(), 0);
    }

    #[test]
    fn test_persisted_layout() {
        let session = sample_session(&["admin"], Duration::hours(1));
        let json = serde_json::to_value(session.to_persisted()).expect("serialize");
        assert_eq!(json["accessToken"], "access-1");
        assert_eq!(json["refreshToken"], "refresh-1");
        assert_eq!(json["isAdmin"], true);
        assert_eq!(
            json["expiresAt"].as_i64(),
            Some(session.access.expires_at.timestamp_millis())
        );
        assert_eq!(json["user"]["name"], "admin");
    }

    #[test]
    fn test_persisted_is_admin_is_not_trusted() {
        let json = r#"{
            "user": {"id": 7, "name": "mallory", "roles": ["reader"]},
            "accessToken": "a",
            "refreshToken": "r",
            "isAdmin": true,
            "expiresAt": 1893456000000
        }"#;
        let persisted: PersistedSession = serde_json::from_str(json).expect("parse");
        let session = SessionData::from(persisted);
        assert_eq!(session.user.id, "7");
        assert!(!session.is_admin());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let session = sample_session(&[], Duration::hours(1));
        let rendered = format!("{:?}", session);
        assert!(!rendered.contains("access-1"));
        assert!(!rendered.contains("refresh-1"));
        let creds = Credentials::new("admin", "123456");
        assert!(!format!("{:?}", creds).contains("123456"));
    }
}
