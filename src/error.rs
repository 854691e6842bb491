//! Custom error types for modwatch.
//!
//! This module provides a centralized error handling system with specific error types
//! for the different collaborators the bot talks to.

use thiserror::Error;

/// Main error type for modwatch operations.
#[derive(Debug, Error)]
pub enum ModwatchError {
    /// Configuration errors (missing env vars, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),
    /// Network/HTTP errors
    #[error("Network error: {0}")]
    Network(String),
    /// Mod portal API errors (unexpected status, undecodable payload)
    #[error("Mod portal API error: {0}")]
    PortalApi(String),
    /// Discord bot errors
    #[error("Discord error: {0}")]
    Discord(String),
    /// Persisted state backend errors
    #[error("Storage error: {0}")]
    Storage(String),
    /// Persisted state could not be decoded, even after retrying
    #[error("Corrupt persisted state '{key}': {reason}")]
    CorruptState { key: String, reason: String },
    /// A timestamp that is not valid RFC 3339
    #[error("Invalid timestamp: '{0}'")]
    InvalidTimestamp(String),
    /// Validation errors (invalid subscription changes, bad uploads)
    #[error("Validation error: {0}")]
    Validation(String),
    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModwatchError {
    /// Whether the process must stop rather than skip and carry on.
    ///
    /// Only an unknown subscription or watermark state is fatal; every
    /// collaborator failure is recovered by skipping the affected work.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CorruptState { .. })
    }
}

impl From<rusqlite::Error> for ModwatchError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for ModwatchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ModwatchError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Storage(format!("Task join error: {}", err))
    }
}

impl From<poise::serenity_prelude::Error> for ModwatchError {
    fn from(err: poise::serenity_prelude::Error) -> Self {
        Self::Discord(err.to_string())
    }
}

/// Result type alias for modwatch operations.
pub type Result<T> = std::result::Result<T, ModwatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_corrupt_state_is_fatal() {
        let corrupt = ModwatchError::CorruptState {
            key: "subscriptions".to_string(),
            reason: "expected value".to_string(),
        };
        assert!(corrupt.is_fatal());
        assert!(!ModwatchError::Network("timeout".to_string()).is_fatal());
        assert!(!ModwatchError::Storage("disk full".to_string()).is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = ModwatchError::InvalidTimestamp("yesterday".to_string());
        assert_eq!(err.to_string(), "Invalid timestamp: 'yesterday'");

        let err = ModwatchError::CorruptState {
            key: "watermark".to_string(),
            reason: "EOF".to_string(),
        };
        assert_eq!(err.to_string(), "Corrupt persisted state 'watermark': EOF");
    }
}
