//! Error types for webhook delivery operations.
//!
//! Distinguishes transport failures (which produce a log row with status 0
//! and may be retried) from configuration and persistence failures (which
//! abort the delivery chain).

use thiserror::Error;

/// Result type alias using `DeliveryError`.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors raised during webhook delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Connection failed, DNS failed, or the request never completed.
    #[error("network error: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },

    /// Request exceeded the configured timeout.
    #[error("request timed out after {timeout_seconds}s")]
    Timeout {
        /// Timeout that was exceeded, in seconds.
        timeout_seconds: u64,
    },

    /// Client or subscription configuration is unusable.
    #[error("configuration error: {message}")]
    Configuration {
        /// What is wrong with the configuration.
        message: String,
    },

    /// Persisting to or reading from storage failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// Payload could not be serialized.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into() }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Only transport-level failures are retryable. Configuration and
    /// serialization problems will fail identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

impl From<selfkey_core::CoreError> for DeliveryError {
    fn from(err: selfkey_core::CoreError) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
