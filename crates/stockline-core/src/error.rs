//! # Error Types
//!
//! Domain-specific error types for stockline-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockline-core errors (this file)                                     │
//! │  ├── CoreError        - Stock rule violations                          │
//! │  └── ValidationError  - Missing / malformed tenant input               │
//! │                                                                         │
//! │  stockline-db errors (separate crate)                                  │
//! │  ├── DbError          - Store of record failures                       │
//! │  └── CacheError       - Cache transport / payload failures             │
//! │                                                                         │
//! │  stockline-engine errors                                               │
//! │  └── EngineError      - The seven kinds callers see                    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → tonic::Status       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Stock rule violations raised by the pure reconciliation functions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A decrease would push stock below zero.
    ///
    /// ## When This Occurs
    /// ```text
    /// Create movement (qty: -20)
    ///      │
    ///      ▼
    /// Check stock: available=10
    ///      │
    ///      ▼
    /// InsufficientStock { available: 10, requested: 20 }
    /// ```
    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    /// Reversing or re-applying a movement would push stock below zero.
    ///
    /// ## When This Occurs
    /// - Deleting a +50 movement when only 30 units remain
    /// - Editing a movement to a decrease the repaired baseline cannot cover
    #[error("Cannot reverse movement: stock {stock} would become {would_be}")]
    CannotReverse { stock: i64, would_be: i64 },

    /// Arithmetic left the representable range.
    #[error("Stock arithmetic overflow: {stock} + {delta}")]
    StockOverflow { stock: i64, delta: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any write happens, so they never need a rollback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },
}

impl ValidationError {
    /// Creates a Required error for the given field.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
