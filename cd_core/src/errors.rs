//! # Error Types
//!
//! Structured error types for cd_core. Hard failures abort a generation run;
//! soft findings are reported as [`QcIssue`](crate::qc::QcIssue) records instead.
//!
//! ## Example
//!
//! ```rust
//! use cd_core::errors::{CdError, CdResult};
//!
//! fn validate_area(area_m2: f64) -> CdResult<()> {
//!     if area_m2 <= 0.0 {
//!         return Err(CdError::InvalidInput {
//!             field: "area_m2".to_string(),
//!             value: area_m2.to_string(),
//!             reason: "Area must be positive".to_string(),
//!         });
//!     }
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for cd_core operations
pub type CdResult<T> = Result<T, CdError>;

/// Structured error type for generation operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum CdError {
    /// Requirements input could not be understood
    #[error("Parse error at line {line}: {reason}")]
    ParseError { line: usize, reason: String },

    /// An input value is invalid (out of range, empty, etc.)
    #[error("Invalid input for '{field}': {value} - {reason}")]
    InvalidInput {
        field: String,
        value: String,
        reason: String,
    },

    /// The room program cannot be packed inside the allowed envelope
    #[error("Packing infeasible: room '{room}' does not fit envelope {envelope_w_m:.2} x {envelope_d_m:.2} m - {reason}")]
    PackingInfeasible {
        room: String,
        envelope_w_m: f64,
        envelope_d_m: f64,
        reason: String,
    },

    /// One export format failed; the others are unaffected
    #[error("Export error ({format}): {reason}")]
    ExportError { format: String, reason: String },

    /// File I/O error
    #[error("File error: {operation} on '{path}' - {reason}")]
    FileError {
        operation: String,
        path: String,
        reason: String,
    },

    /// Output location is locked by another user/process
    #[error("File locked: '{path}' is locked by {locked_by} since {locked_at}")]
    FileLocked {
        path: String,
        locked_by: String,
        locked_at: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },

    /// Schema version mismatch
    #[error("Version mismatch: file version {file_version}, expected {expected_version}")]
    VersionMismatch {
        file_version: String,
        expected_version: String,
    },

    /// A run was cancelled between stages
    #[error("Generation cancelled before stage '{stage}'")]
    Cancelled { stage: String },

    /// The selected CAD/BIM backend cannot be used in this build
    #[error("Backend unavailable: {backend} - {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// Unknown project or revision
    #[error("Not found: {kind} '{id}'")]
    NotFound { kind: String, id: String },

    /// Generic internal error (should be rare)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CdError {
    /// Create a ParseError
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        CdError::ParseError {
            line,
            reason: reason.into(),
        }
    }

    /// Create an InvalidInput error
    pub fn invalid_input(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        CdError::InvalidInput {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an ExportError
    pub fn export(format: impl Into<String>, reason: impl Into<String>) -> Self {
        CdError::ExportError {
            format: format.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileError
    pub fn file_error(operation: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        CdError::FileError {
            operation: operation.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileLocked error
    pub fn file_locked(path: impl Into<String>, locked_by: impl Into<String>, locked_at: impl Into<String>) -> Self {
        CdError::FileLocked {
            path: path.into(),
            locked_by: locked_by.into(),
            locked_at: locked_at.into(),
        }
    }

    /// Create a NotFound error
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        CdError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        CdError::Internal {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error (caller may fix input or retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CdError::ParseError { .. }
                | CdError::InvalidInput { .. }
                | CdError::FileLocked { .. }
                | CdError::Cancelled { .. }
        )
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            CdError::ParseError { .. } => "PARSE_ERROR",
            CdError::InvalidInput { .. } => "INVALID_INPUT",
            CdError::PackingInfeasible { .. } => "PACKING_INFEASIBLE",
            CdError::ExportError { .. } => "EXPORT_ERROR",
            CdError::FileError { .. } => "FILE_ERROR",
            CdError::FileLocked { .. } => "FILE_LOCKED",
            CdError::SerializationError { .. } => "SERIALIZATION_ERROR",
            CdError::VersionMismatch { .. } => "VERSION_MISMATCH",
            CdError::Cancelled { .. } => "CANCELLED",
            CdError::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            CdError::NotFound { .. } => "NOT_FOUND",
            CdError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for CdError {
    fn from(e: serde_json::Error) -> Self {
        CdError::SerializationError {
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let error = CdError::PackingInfeasible {
            room: "Hall".to_string(),
            envelope_w_m: 10.0,
            envelope_d_m: 10.0,
            reason: "room larger than envelope cap".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"type\":\"PackingInfeasible\""));
        let roundtrip: CdError = serde_json::from_str(&json).unwrap();
        assert_eq!(error, roundtrip);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CdError::parse(3, "no rooms").error_code(), "PARSE_ERROR");
        assert_eq!(CdError::export("cad", "io").error_code(), "EXPORT_ERROR");
        assert_eq!(CdError::not_found("revision", "r1").error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_recoverable() {
        assert!(CdError::parse(1, "bad").is_recoverable());
        assert!(!CdError::internal("boom").is_recoverable());
    }
}
