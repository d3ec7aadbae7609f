//! Error types for helixrun-state

use thiserror::Error;

/// Errors that can occur in the session store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No session exists for the given key
    #[error("Session not found: {key}")]
    SessionNotFound { key: String },

    /// A key component was empty or otherwise unusable
    #[error("Invalid session key: {0}")]
    InvalidKey(String),
}
