//! # AppError
//!
//! Centralized error handling for the Cerberus workspace.
//! Adapters map their library failures onto these variants so the engine can
//! decide what to log and what to retry.

use thiserror::Error;

use crate::models::{ContentStatus, Transition};

/// The primary error type for all cb-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// No content item with this id
    #[error("content item {id} not found")]
    NotFound { id: i64 },

    /// Validation failure (e.g., empty post text, empty image prompt)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Persistence layer failure
    #[error("storage error: {0}")]
    StorageError(String),

    /// The generative API call failed or returned nothing usable
    #[error("generation error: {0}")]
    GenerationError(String),

    /// The social API rejected or failed a post; `code` is the HTTP status
    /// when one was received, 0 for transport failures.
    #[error("publish error ({code}): {message}")]
    PublishError { code: u16, message: String },

    /// A status change the queue does not allow
    #[error("cannot {transition} an item that is {from}")]
    InvalidTransition {
        from: ContentStatus,
        transition: Transition,
    },

    /// Missing or inconsistent settings
    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// A specialized Result type for Cerberus logic.
pub type Result<T> = std::result::Result<T, AppError>;
