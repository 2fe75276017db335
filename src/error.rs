//! Error types for hexstash
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StashError
pub type Result<T> = std::result::Result<T, StashError>;

/// Unified error type for hexstash operations
#[derive(Debug, Error)]
pub enum StashError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Data exists for key '{0}'; pass overwrite to replace it")]
    AlreadyExists(String),

    #[error("Key inconsistency at {address}: expected '{expected}', found {found:?}")]
    Consistency {
        address: String,
        expected: String,
        found: Option<String>,
    },

    #[error("Address space exhausted after {capacity} addresses")]
    Exhaustion { capacity: u64 },

    #[error("Store is open read-only")]
    ReadOnly,

    #[error("Store or container handle is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Container Errors
    // -------------------------------------------------------------------------
    #[error("Container corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Field / Value Errors
    // -------------------------------------------------------------------------
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Invalid slice: {0}")]
    InvalidSlice(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl From<bincode::Error> for StashError {
    fn from(e: bincode::Error) -> Self {
        StashError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for StashError {
    fn from(e: serde_json::Error) -> Self {
        StashError::Serialization(e.to_string())
    }
}
