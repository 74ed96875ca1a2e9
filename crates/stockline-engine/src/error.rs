//! # Engine Error Types
//!
//! The seven outcomes a reconciliation request can fail with, and their gRPC
//! status codes.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  ValidationError / CoreError   DbError          RoleLookupError         │
//! │       │                          │                   │                  │
//! │       └──────────────┬───────────┴───────────────────┘                  │
//! │                      ▼                                                  │
//! │                EngineError  ── kind() ──► ErrorKind                     │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │               tonic::Status                                            │
//! │                                                                         │
//! │  PermissionDenied     → PERMISSION_DENIED                              │
//! │  NotFound             → NOT_FOUND                                      │
//! │  InvalidInput         → INVALID_ARGUMENT                               │
//! │  InsufficientStock    → FAILED_PRECONDITION                            │
//! │  CannotReverse        → FAILED_PRECONDITION                            │
//! │  ExternalUnavailable  → UNAVAILABLE                                    │
//! │  Inconsistent         → DATA_LOSS                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use stockline_core::{CoreError, ValidationError};
use stockline_db::DbError;
use thiserror::Error;
use tonic::Status;

use crate::roles::RoleLookupError;

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PermissionDenied,
    NotFound,
    InvalidInput,
    InsufficientStock,
    CannotReverse,
    ExternalUnavailable,
    Inconsistent,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A decrease asked for more than is on hand.
    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    /// Reversing or editing a movement would drive stock below zero.
    #[error("Cannot reverse movement: stock {stock} would become {would_be}")]
    CannotReverse { stock: i64, would_be: i64 },

    /// A collaborator failed, timed out, or the deadline passed.
    #[error("Service unavailable: {0}")]
    ExternalUnavailable(String),

    /// A compensating write failed; ledger and product stock may disagree.
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::InvalidInput(_) => ErrorKind::InvalidInput,
            EngineError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            EngineError::CannotReverse { .. } => ErrorKind::CannotReverse,
            EngineError::ExternalUnavailable(_) => ErrorKind::ExternalUnavailable,
            EngineError::Inconsistent(_) => ErrorKind::Inconsistent,
        }
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        EngineError::PermissionDenied(reason.into())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        EngineError::ExternalUnavailable(reason.into())
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::InvalidInput(err.to_string())
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientStock { available, requested } => {
                EngineError::InsufficientStock { available, requested }
            }
            CoreError::CannotReverse { stock, would_be } => {
                EngineError::CannotReverse { stock, would_be }
            }
            CoreError::StockOverflow { .. } => EngineError::InvalidInput(err.to_string()),
            CoreError::Validation(e) => e.into(),
        }
    }
}

/// ## Error Mapping
/// ```text
/// NotFound                         → NotFound
/// UnsupportedScope                 → PermissionDenied
/// UniqueViolation / ForeignKey     → InvalidInput
/// Conflict (retries handled above) → ExternalUnavailable
/// transport / query failures       → ExternalUnavailable
/// ```
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::UnsupportedScope(reason) => EngineError::PermissionDenied(reason),
            DbError::UniqueViolation { .. } | DbError::ForeignKeyViolation { .. } => {
                EngineError::InvalidInput(err.to_string())
            }
            other => EngineError::ExternalUnavailable(other.to_string()),
        }
    }
}

impl From<RoleLookupError> for EngineError {
    fn from(err: RoleLookupError) -> Self {
        match err {
            RoleLookupError::RoleNotFound(_) => EngineError::permission_denied("invalid role"),
            other => EngineError::ExternalUnavailable(other.to_string()),
        }
    }
}

impl From<EngineError> for Status {
    fn from(error: EngineError) -> Self {
        let message = error.to_string();
        match error {
            EngineError::PermissionDenied(_) => Status::permission_denied(message),
            EngineError::NotFound { .. } => Status::not_found(message),
            EngineError::InvalidInput(_) => Status::invalid_argument(message),
            EngineError::InsufficientStock { .. } => Status::failed_precondition(message),
            EngineError::CannotReverse { .. } => Status::failed_precondition(message),
            EngineError::ExternalUnavailable(_) => Status::unavailable(message),
            EngineError::Inconsistent(_) => Status::data_loss(message),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
