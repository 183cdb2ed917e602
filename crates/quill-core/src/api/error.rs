use thiserror::Error;

/// Errors produced by the transport, the refresh coordinator and the
/// session manager.
///
/// `Clone` so that a single refresh outcome can be handed to every caller
/// that queued behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Request rejected ({code}): {message}")]
    Business {
        code: i64,
        message: String,
        timestamp: String,
    },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to encode request: {0}")]
    Encode(String),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Failed to save session: {0}")]
    Storage(String),
}

/// Coarse classification used by callers that only need to branch on the
/// failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Server understood the request and rejected it. Never tears down the session.
    Business,
    /// Login or refresh credentials were rejected. Terminal.
    Authentication,
    /// A protected call came back 401.
    SessionExpired,
    /// Network, timeout or 5xx. Callers may retry.
    Transport,
    /// Anything else the caller got wrong (403, 404, undecodable body, no session).
    Request,
    /// The session could not be written to local storage.
    Storage,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::SessionExpired,
            403 => ApiError::Forbidden(truncated),
            404 => ApiError::NotFound(truncated),
            code @ 500..=599 => ApiError::Server {
                status: code,
                body: truncated,
            },
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Business { .. } => ErrorKind::Business,
            ApiError::Authentication(_) => ErrorKind::Authentication,
            ApiError::SessionExpired => ErrorKind::SessionExpired,
            ApiError::Server { .. } | ApiError::Network(_) | ApiError::Timeout => {
                ErrorKind::Transport
            }
            ApiError::Forbidden(_)
            | ApiError::NotFound(_)
            | ApiError::InvalidResponse(_)
            | ApiError::Encode(_)
            | ApiError::NotLoggedIn => ErrorKind::Request,
            ApiError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Text shown to the user when this error is reported through a notifier.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Business { message, .. } => message.clone(),
            ApiError::Authentication(reason) => format!("Login failed: {}", reason),
            ApiError::SessionExpired => "Your session has expired, please log in again".to_string(),
            ApiError::Forbidden(_) => "You do not have permission to do that".to_string(),
            ApiError::NotFound(_) => "The requested resource was not found".to_string(),
            ApiError::Server { .. } => "Server error, please try again later".to_string(),
            ApiError::Network(_) | ApiError::Timeout => {
                "Network error, please check your connection".to_string()
            }
            ApiError::InvalidResponse(_) => "Unexpected response from server".to_string(),
            ApiError::Encode(_) => "Could not send the request".to_string(),
            ApiError::NotLoggedIn => "Please log in first".to_string(),
            ApiError::Storage(_) => "Could not save your session on this device".to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}
