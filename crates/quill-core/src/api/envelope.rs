use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::ApiError;

/// Envelope code meaning "ok".
pub const SUCCESS_CODE: i64 = 200;

/// Uniform response wrapper used by every endpoint:
/// `{ code, message, data, timestamp }`.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub timestamp: Value,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    fn timestamp_text(&self) -> String {
        match &self.timestamp {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Hand back the payload, or the embedded rejection as a business error.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        if !self.is_success() {
            let timestamp = self.timestamp_text();
            return Err(ApiError::Business {
                code: self.code,
                message: self.message,
                timestamp,
            });
        }
        serde_json::from_value(self.data)
            .map_err(|e| ApiError::InvalidResponse(format!("Unexpected payload shape: {}", e)))
    }
}
