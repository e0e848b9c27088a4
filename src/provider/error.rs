use thiserror::Error;

use crate::error::ConfigurationError;

use super::ProviderKind;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Errors that can occur when calling a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The client could not be configured (unknown provider, missing key or model)
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The provider answered with a non-success HTTP status
    #[error("{provider} API error: {status} - {message}")]
    Status {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request or response timeout errors
    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// A success response whose body was not valid JSON
    #[error("Malformed response: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl ProviderError {
    /// Classifies a transport failure as a timeout or a generic network error.
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error)
        } else {
            Self::Network(error)
        }
    }

    /// Returns the HTTP status for status errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` when the provider is asking the caller to slow down.
    ///
    /// Matches HTTP 429, or an error message mentioning "quota" or
    /// "rate limit" (any casing), since some providers report exhausted quota
    /// under other status codes.
    pub fn is_rate_limited(&self) -> bool {
        if self.status() == Some(429) {
            return true;
        }
        let message = self.to_string().to_lowercase();
        message.contains("quota") || message.contains("rate limit")
    }
}

/// Pulls a human-readable message out of an error response body.
///
/// Prefers `error.message` (Google and OpenAI-compatible envelopes), then a
/// string `error` or `message` field, then the raw body capped at 500 chars.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let message = json
            .pointer("/error/message")
            .or_else(|| json.get("error"))
            .or_else(|| json.get("message"))
            .and_then(serde_json::Value::as_str);
        if let Some(message) = message
            && !message.trim().is_empty()
        {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "Unknown error".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn status_error(status: u16, message: &str) -> ProviderError {
        ProviderError::Status {
            provider: ProviderKind::Google,
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn status_error_display_includes_provider_status_and_message() {
        let err = status_error(403, "API key not valid");
        assert_eq!(
            err.to_string(),
            "Google AI API error: 403 - API key not valid"
        );
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn http_429_is_rate_limited() {
        assert!(status_error(429, "Too Many Requests").is_rate_limited());
    }

    #[test]
    fn quota_and_rate_limit_messages_are_rate_limited() {
        assert!(status_error(403, "You exceeded your current quota").is_rate_limited());
        assert!(status_error(400, "Rate limit reached for requests").is_rate_limited());
    }

    #[test]
    fn other_errors_are_not_rate_limited() {
        assert!(!status_error(500, "Internal error").is_rate_limited());
        assert!(!status_error(401, "Invalid API key").is_rate_limited());
        assert!(!ProviderError::from(ConfigurationError::MissingApiKey).is_rate_limited());
    }

    #[test]
    fn network_error_variant_display() {
        let reqwest_error = reqwest::blocking::Client::new()
            .get("not-a-valid-url")
            .build()
            .unwrap_err();
        let err = ProviderError::from_transport(reqwest_error);

        assert!(err.to_string().contains("Network error"));
        assert!(err.source().is_some());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn serialization_error_keeps_source() {
        let json_error = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err = ProviderError::Serialization(json_error);

        assert!(err.to_string().starts_with("Malformed response"));
        assert!(err.source().is_some());
    }

    #[test]
    fn configuration_error_is_transparent() {
        let err = ProviderError::from(ConfigurationError::MissingModel);
        assert_eq!(err.to_string(), "Model is required");
    }

    #[test]
    fn error_message_prefers_nested_message() {
        let body = r#"{"error": {"code": 429, "message": "Resource has been exhausted (e.g. check quota).", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            error_message(body),
            "Resource has been exhausted (e.g. check quota)."
        );
    }

    #[test]
    fn error_message_accepts_flat_fields() {
        assert_eq!(error_message(r#"{"error": "bad model"}"#), "bad model");
        assert_eq!(error_message(r#"{"message": "nope"}"#), "nope");
    }

    #[test]
    fn error_message_falls_back_to_body_text() {
        assert_eq!(error_message("  upstream unavailable \n"), "upstream unavailable");
        assert_eq!(error_message(""), "Unknown error");
        assert_eq!(error_message(r#"{"error": {"code": 500}}"#), r#"{"error": {"code": 500}}"#);

        let long = "x".repeat(MAX_ERROR_BODY_CHARS * 2);
        assert_eq!(error_message(&long).len(), MAX_ERROR_BODY_CHARS);
    }
}
