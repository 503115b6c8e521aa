//! # Error Types
//!
//! Domain-specific error types for meridian-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  meridian-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  meridian-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  meridian-engine errors                                                │
//! │  └── EngineError      - Wraps both for orchestration paths             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, numbers, quantities)
//! 3. Errors are enum variants, never String
//! 4. Validation errors are raised before any write; consistency errors
//!    abort the enclosing transaction

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found or is inactive.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Customer reference does not resolve.
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// A sale-type deduction would drive stock negative and the product
    /// does not allow backorder.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Sale not found.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Sale is not in a state that allows the requested operation.
    ///
    /// Raised when refunding a voided sale or re-refunding a refunded one.
    #[error("Sale {sale_id} is {current_status}, cannot perform operation")]
    InvalidSaleStatus {
        sale_id: String,
        current_status: String,
    },

    /// Refund not found.
    #[error("Refund not found: {0}")]
    RefundNotFound(String),

    /// Refund is not in a state that allows the requested transition.
    ///
    /// Only pending refunds can be approved or rejected.
    #[error("Refund {refund_id} is {current_status}, cannot perform operation")]
    InvalidRefundStatus {
        refund_id: String,
        current_status: String,
    },

    /// Cumulative refunded quantity would exceed the quantity sold.
    #[error(
        "Refund quantity {requested} exceeds remaining {remaining} on sale line {sale_item_id}"
    )]
    RefundExceedsSold {
        sale_item_id: String,
        remaining: i64,
        requested: i64,
    },

    /// No open drawer session for the (store, cashier) pair.
    #[error("No active drawer session for cashier {cashier_id} at store {store_id}")]
    NoActiveDrawerSession {
        store_id: String,
        cashier_id: String,
    },

    /// Payment set does not cover the sale total.
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// Material return request not found or already resolved.
    #[error("Material return {0} not found or already resolved")]
    MaterialReturnNotFound(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any write so a malformed request never opens a transaction.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A sale needs at least one line item.
    #[error("sale requires at least one line item")]
    NoLineItems,

    /// A paid sale needs at least one payment.
    #[error("sale requires at least one payment")]
    NoPayments,

    /// A refund needs at least one line item.
    #[error("refund requires at least one line item")]
    NoRefundItems,
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            sku: "GRAVEL-20".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for GRAVEL-20: available 3, requested 5"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "store_id".to_string(),
        };
        assert_eq!(err.to_string(), "store_id is required");

        assert_eq!(
            ValidationError::NoLineItems.to_string(),
            "sale requires at least one line item"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::NoPayments;
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
