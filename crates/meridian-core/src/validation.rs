//! # Validation Module
//!
//! Draft input types and the pre-write validation rules applied to them.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE - structural checks on the draft                 │
//! │  ├── store/cashier refs present, ≥1 item, positive quantities          │
//! │  └── rejected before any transaction is opened                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engine - business checks inside the transaction              │
//! │  ├── product exists and is active                                      │
//! │  ├── payments cover the computed total                                 │
//! │  └── refund bound against prior refunds                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database - NOT NULL, UNIQUE, FK constraints                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{PaymentMethod, PaymentStatus, RefundType};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Hard cap on line quantity, to catch fat-finger entries (1000 for 10).
pub const MAX_LINE_QUANTITY: i64 = 999;

// =============================================================================
// Draft Types
// =============================================================================

/// The request payload for creating a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleDraft {
    pub store_id: String,
    pub cashier_id: String,
    pub customer_id: Option<String>,

    pub items: Vec<SaleItemDraft>,
    pub payments: Vec<PaymentDraft>,

    /// Order-level discount in cents (on top of per-line discounts).
    #[serde(default)]
    pub discount_cents: i64,

    /// Promotion that produced the discount, if any. Recorded post-commit.
    #[serde(default)]
    pub promotion_id: Option<String>,

    /// Defaults to `Paid`; `Partial`/`Unpaid` relax the payment-coverage
    /// requirement.
    #[serde(default = "default_payment_status")]
    pub payment_status: PaymentStatus,
}

fn default_payment_status() -> PaymentStatus {
    PaymentStatus::Paid
}

/// One requested sale line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleItemDraft {
    pub product_id: String,
    pub quantity: i64,
    /// Price override in cents; `None` takes the catalog price.
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
    #[serde(default)]
    pub discount_cents: i64,
}

/// One requested payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDraft {
    pub method: PaymentMethod,
    pub amount_cents: i64,
    #[serde(default)]
    pub reference: Option<String>,
}

/// The request payload for creating a refund.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundDraft {
    pub sale_id: String,
    pub refund_type: RefundType,
    pub items: Vec<RefundItemDraft>,
    #[serde(default)]
    pub reason: Option<String>,
    pub requested_by: String,
}

/// One refund line, drawing down an original sale line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundItemDraft {
    pub sale_item_id: String,
    pub quantity: i64,
}

// =============================================================================
// Draft Validators
// =============================================================================

/// Validates a sale draft before any write.
///
/// ## Rules
/// - store_id and cashier_id present
/// - at least one line item, every quantity in 1..=MAX_LINE_QUANTITY
/// - price overrides and discounts non-negative
/// - at least one payment with a positive amount, unless payment_status is
///   explicitly partial/unpaid
pub fn validate_sale_draft(draft: &SaleDraft) -> ValidationResult<()> {
    validate_ref("store_id", &draft.store_id)?;
    validate_ref("cashier_id", &draft.cashier_id)?;

    if draft.items.is_empty() {
        return Err(ValidationError::NoLineItems);
    }

    for item in &draft.items {
        validate_ref("product_id", &item.product_id)?;
        validate_quantity(item.quantity)?;

        if let Some(price) = item.unit_price_cents {
            if price < 0 {
                return Err(ValidationError::OutOfRange {
                    field: "unit_price".to_string(),
                    min: 0,
                    max: i64::MAX,
                });
            }
        }
        if item.discount_cents < 0 {
            return Err(ValidationError::OutOfRange {
                field: "discount".to_string(),
                min: 0,
                max: i64::MAX,
            });
        }
    }

    if draft.discount_cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    let requires_payment = matches!(draft.payment_status, PaymentStatus::Paid);
    if requires_payment && draft.payments.is_empty() {
        return Err(ValidationError::NoPayments);
    }

    for payment in &draft.payments {
        if payment.amount_cents <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "payment amount".to_string(),
            });
        }
    }

    Ok(())
}

/// Validates a refund draft before any write.
pub fn validate_refund_draft(draft: &RefundDraft) -> ValidationResult<()> {
    validate_ref("sale_id", &draft.sale_id)?;
    validate_ref("requested_by", &draft.requested_by)?;

    if draft.items.is_empty() {
        return Err(ValidationError::NoRefundItems);
    }

    for item in &draft.items {
        validate_ref("sale_item_id", &item.sale_item_id)?;
        validate_quantity(item.quantity)?;
    }

    Ok(())
}

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a reference field (store, cashier, product, etc.).
pub fn validate_ref(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a line quantity: positive and within the fat-finger cap.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an opening drawer amount (non-negative).
pub fn validate_opening_amount(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "opening_amount".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_draft() -> SaleDraft {
        SaleDraft {
            store_id: "store-1".into(),
            cashier_id: "cashier-1".into(),
            customer_id: None,
            items: vec![SaleItemDraft {
                product_id: "prod-1".into(),
                quantity: 2,
                unit_price_cents: None,
                discount_cents: 0,
            }],
            payments: vec![PaymentDraft {
                method: PaymentMethod::Cash,
                amount_cents: 1000,
                reference: None,
            }],
            discount_cents: 0,
            promotion_id: None,
            payment_status: PaymentStatus::Paid,
        }
    }

    #[test]
    fn test_valid_sale_draft() {
        assert!(validate_sale_draft(&sample_draft()).is_ok());
    }

    #[test]
    fn test_missing_store_rejected() {
        let mut draft = sample_draft();
        draft.store_id = "  ".into();
        assert!(matches!(
            validate_sale_draft(&draft),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_empty_items_rejected() {
        let mut draft = sample_draft();
        draft.items.clear();
        assert!(matches!(
            validate_sale_draft(&draft),
            Err(ValidationError::NoLineItems)
        ));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut draft = sample_draft();
        draft.items[0].quantity = 0;
        assert!(matches!(
            validate_sale_draft(&draft),
            Err(ValidationError::MustBePositive { .. })
        ));
    }

    #[test]
    fn test_no_payments_rejected_when_paid() {
        let mut draft = sample_draft();
        draft.payments.clear();
        assert!(matches!(
            validate_sale_draft(&draft),
            Err(ValidationError::NoPayments)
        ));
    }

    #[test]
    fn test_no_payments_allowed_when_unpaid() {
        let mut draft = sample_draft();
        draft.payments.clear();
        draft.payment_status = PaymentStatus::Unpaid;
        assert!(validate_sale_draft(&draft).is_ok());
    }

    #[test]
    fn test_quantity_cap() {
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_refund_draft() {
        let draft = RefundDraft {
            sale_id: "sale-1".into(),
            refund_type: RefundType::Full,
            items: vec![RefundItemDraft {
                sale_item_id: "item-1".into(),
                quantity: 1,
            }],
            reason: None,
            requested_by: "manager-1".into(),
        };
        assert!(validate_refund_draft(&draft).is_ok());

        let empty = RefundDraft { items: vec![], ..draft };
        assert!(matches!(
            validate_refund_draft(&empty),
            Err(ValidationError::NoRefundItems)
        ));
    }
}
