//! Error types for the live data subscription.
//!
//! Fetch failures never escape a [`Resource`](crate::Resource): they are
//! stored on its [`FetchState`](crate::FetchState) and rendered by the
//! consumer. That is why the error is `Clone` and carries its details as
//! strings rather than boxed sources.

use thiserror::Error;

/// Errors surfaced by the live data layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LiveError {
    /// Transport-level failure (connection, TLS, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    Http {
        /// Response status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The response body was not valid JSON.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// The JSON did not have the expected shape.
    #[error("unexpected data shape: {0}")]
    Decode(String),

    /// The pointer file lists no snapshot directory.
    #[error("no latest pointer found")]
    NoPointer,

    /// The operators are holding the results back.
    #[error("results are not ready to be displayed yet")]
    Curtain,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// No tokio runtime to spawn fetches on.
    #[error("the live data context must be created inside a tokio runtime")]
    NoRuntime,
}

impl LiveError {
    /// Returns a user-friendly error message suitable for display in the UI.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::Network(_) | Self::Http { .. } => {
                "Could not reach the results server. Retrying shortly."
            }
            Self::JsonParse(_) | Self::Decode(_) => "The results data could not be read.",
            Self::NoPointer => "No results have been published yet.",
            Self::Curtain => "Results are not ready to be displayed yet.",
            Self::Config(_) | Self::NoRuntime => "An unexpected error occurred.",
        }
    }

    /// Whether the next poll cycle may clear this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Http { .. } | Self::NoPointer | Self::Curtain
        )
    }

    /// Whether this error is synthesized from the pointer file rather than
    /// caused by a failed request.
    #[must_use]
    pub fn is_gate(&self) -> bool {
        matches!(self, Self::NoPointer | Self::Curtain)
    }
}

impl From<reqwest::Error> for LiveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::JsonParse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LiveError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() {
            Self::Decode(err.to_string())
        } else {
            Self::JsonParse(err.to_string())
        }
    }
}

impl From<toml::de::Error> for LiveError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for live data operations.
pub type Result<T> = std::result::Result<T, LiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let err = LiveError::Network("connection refused".to_string());
        assert!(err.user_message().contains("results server"));
        assert!(LiveError::Curtain.user_message().contains("not ready"));
        assert!(LiveError::NoPointer.user_message().contains("published"));
    }

    #[test]
    fn test_retryable() {
        assert!(LiveError::Network("timeout".to_string()).is_retryable());
        assert!(
            LiveError::Http {
                status: 503,
                url: "/data/latest.json".to_string()
            }
            .is_retryable()
        );
        assert!(!LiveError::Decode("missing field".to_string()).is_retryable());
        assert!(!LiveError::NoRuntime.is_retryable());
    }

    #[test]
    fn test_serde_errors_are_classified() {
        let syntax = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(LiveError::from(syntax), LiveError::JsonParse(_)));

        let shape = serde_json::from_str::<Vec<u32>>("{}").unwrap_err();
        assert!(matches!(LiveError::from(shape), LiveError::Decode(_)));
    }

    #[test]
    fn test_gate_errors() {
        assert!(LiveError::Curtain.is_gate());
        assert!(LiveError::NoPointer.is_gate());
        assert!(!LiveError::Network(String::new()).is_gate());
    }
}
