//! Error types for the Psalter SDK.

use psalter_core::normalize_error;
use serde_json::{json, Value};
use thiserror::Error;

/// A rejection from the remote collection API.
///
/// `data` holds the body the server attached to the rejection; `response`
/// holds the full response when the error was wrapped by an API client.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} (status {status})")]
pub struct GatewayError {
    pub status: u16,
    pub message: String,
    pub data: Value,
    pub response: Option<Value>,
}

impl GatewayError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: Value::Null,
            response: None,
        }
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::new(404, format!("Record {} not found in {}", id, collection))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    /// The structural view the message normalizer inspects.
    pub fn payload(&self) -> Value {
        let mut payload = json!({
            "status": self.status,
            "message": self.message,
            "data": self.data,
        });
        if let Some(response) = &self.response {
            payload["response"] = response.clone();
        }
        payload
    }
}

/// Errors surfaced by store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Failed to decode {collection} record: {source}")]
    Decode {
        collection: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("{0}")]
    Validation(String),

    #[error("{0} is already in progress")]
    Busy(String),
}

impl StoreError {
    pub fn decode(collection: &str, source: serde_json::Error) -> Self {
        StoreError::Decode {
            collection: collection.to_string(),
            source,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            StoreError::Gateway(e) => e.payload(),
            other => json!({ "message": other.to_string() }),
        }
    }

    /// The message stored in a mirror's `error` field.
    pub fn display_message(&self) -> String {
        normalize_error(&self.payload())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Gateway(e) => Some(e.status),
            _ => None,
        }
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_message_prefers_data_message() {
        let err = StoreError::from(
            GatewayError::bad_request("Failed to create record.")
                .with_data(json!({"message": "Name must be unique"})),
        );
        assert_eq!(err.display_message(), "Name must be unique");
    }

    #[test]
    fn test_display_message_uses_wrapped_response() {
        let err = StoreError::from(
            GatewayError::new(500, "").with_response(json!({"data": {"message": "Upstream down"}})),
        );
        assert_eq!(err.display_message(), "Upstream down");
    }

    #[test]
    fn test_display_message_for_local_errors() {
        assert_eq!(StoreError::Unauthenticated.display_message(), "Not authenticated");
        assert_eq!(
            StoreError::Validation("Invalid API key format".into()).display_message(),
            "Invalid API key format"
        );
        assert_eq!(
            StoreError::Busy("Elvanto import".into()).display_message(),
            "Elvanto import is already in progress"
        );
    }
}
