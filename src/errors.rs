//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the case registry, providing structured
//! error types and conversion utilities for all system components.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from storage, numbering, and API components
//! - **Output**: Structured error types with context and error chains
//! - **Error Categories**: Configuration, Validation, Identity, Storage, Generic
//!
//! ## Key Features
//! - Hierarchical error types with detailed context
//! - Automatic error conversion and chaining
//! - User-friendly error messages for API responses
//! - Structured logging integration
//! - Recovery suggestions where applicable
//!
//! ## Usage
//! ```rust
//! use case_registry::errors::{RegistryError, Result};
//!
//! fn guard_year(year: i32) -> Result<()> {
//!     if !(1000..=9999).contains(&year) {
//!         return Err(RegistryError::ValidationFailed {
//!             field: "year".to_string(),
//!             reason: format!("{year} is not a four-digit year"),
//!         });
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Comprehensive error types for the case registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors for case fields
    #[error("Validation failed for field '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    /// Unrecognized case type label
    #[error("Unknown case type '{value}' (expected antigo, novo, or futuro)")]
    UnknownCaseType { value: String },

    // Identity errors
    #[error("Case not found: {slug}")]
    CaseNotFound { slug: String },

    #[error("Slug '{slug}' is already taken by another case")]
    SlugCollision { slug: String },

    #[error("Migration from '{from}' to '{to}' did not complete: {reason}")]
    MigrationFailed {
        from: String,
        to: String,
        reason: String,
    },

    // Storage errors
    #[error("Database connection failed: {db_path} - {reason}")]
    DatabaseConnectionFailed { db_path: String, reason: String },

    #[error("Failed to read document '{key}': {reason}")]
    StoreRead { key: String, reason: String },

    #[error("Failed to write document '{key}': {reason}")]
    StoreWrite { key: String, reason: String },

    #[error("Failed to delete document '{key}': {reason}")]
    StoreDelete { key: String, reason: String },

    #[error("Failed to list collection '{collection}': {reason}")]
    StoreList { collection: String, reason: String },

    #[error("Storage corruption detected: {location} - {details}")]
    StorageCorrupted { location: String, details: String },

    #[error("Serialization failed for {context}: {reason}")]
    Serialization { context: String, reason: String },

    /// Database errors
    #[error("Database error: {0}")]
    Database(sled::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(toml::de::Error),

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RegistryError {
    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RegistryError::DatabaseConnectionFailed { .. }
                | RegistryError::StoreRead { .. }
                | RegistryError::StoreWrite { .. }
                | RegistryError::StoreDelete { .. }
                | RegistryError::StoreList { .. }
                | RegistryError::Database(_)
        )
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            RegistryError::Config { .. } | RegistryError::Toml(_) => "configuration",
            RegistryError::ValidationFailed { .. } | RegistryError::UnknownCaseType { .. } => {
                "validation"
            }
            RegistryError::CaseNotFound { .. }
            | RegistryError::SlugCollision { .. }
            | RegistryError::MigrationFailed { .. } => "identity",
            RegistryError::DatabaseConnectionFailed { .. }
            | RegistryError::StoreRead { .. }
            | RegistryError::StoreWrite { .. }
            | RegistryError::StoreDelete { .. }
            | RegistryError::StoreList { .. }
            | RegistryError::StorageCorrupted { .. }
            | RegistryError::Serialization { .. }
            | RegistryError::Database(_) => "storage",
            RegistryError::Internal { .. } => "generic",
        }
    }

    /// Get suggested recovery action
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            RegistryError::DatabaseConnectionFailed { .. } => {
                Some("Check the database path and permissions, then retry")
            }
            RegistryError::StoreRead { .. }
            | RegistryError::StoreWrite { .. }
            | RegistryError::StoreDelete { .. }
            | RegistryError::StoreList { .. } => {
                Some("Retry the operation; the backend may be briefly unavailable")
            }
            RegistryError::SlugCollision { .. } => {
                Some("Rename the case or merge it with the existing record")
            }
            RegistryError::MigrationFailed { .. } => {
                Some("Re-run renumbering; the duplicate scan heals partial migrations")
            }
            _ => None,
        }
    }
}

// Conversion from common error types
impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Serialization {
            context: "json".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<sled::Error> for RegistryError {
    fn from(err: sled::Error) -> Self {
        RegistryError::Database(err)
    }
}

impl From<toml::de::Error> for RegistryError {
    fn from(err: toml::de::Error) -> Self {
        RegistryError::Toml(err)
    }
}

// Helper macros for common error patterns
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::errors::RegistryError::Internal {
            message: $msg.to_string(),
        }
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::RegistryError::Internal {
            message: format!($fmt, $($arg)*),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($field:expr, $reason:expr) => {
        $crate::errors::RegistryError::ValidationFailed {
            field: $field.to_string(),
            reason: $reason.to_string(),
        }
    };
}
