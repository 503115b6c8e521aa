//! # Domain Types
//!
//! Core domain types for the transaction and inventory-ledger engine.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Domain Types                                   │
//! │                                                                         │
//! │  Sale ──owns──► SaleLineItem ──snapshots──► Product                    │
//! │   │                                                                     │
//! │   ├──owns──► Payment (1..N, split tender)                              │
//! │   └──feeds──► AccountingOutboxEntry (reference = sale_number)          │
//! │                                                                         │
//! │  StockLedgerEntry (append-only)  ◄─derives─  InventoryLevel            │
//! │                                               (projection cache)        │
//! │                                                                         │
//! │  Refund ──owns──► RefundLineItem ──mirrors──► SaleLineItem             │
//! │                                                                         │
//! │  CashDrawerSession: open → counted → closed                            │
//! │                                                                         │
//! │  MaterialMapping / MaterialPool / MaterialMovement: the secondary      │
//! │  "operations" inventory pool linked to the catalog by mapping rows     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business number where externally visible (sale_number, refund_number,
//!   receipt_number) - day-scoped, stable once issued

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01% = 1/10000, so 500 bps = 5%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Status Enums
// =============================================================================

/// The status of a sale transaction.
///
/// Sales are created directly as `completed`; the only transitions afterwards
/// are `completed → refunded` (full refund approved) and
/// `completed → voided` (manual void).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Completed,
    Voided,
    Refunded,
}

/// How much of the sale total has been paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Partial,
    Unpaid,
}

/// Accepted tender types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
    BankTransfer,
    Voucher,
    GiftCard,
}

impl PaymentMethod {
    /// Cash is the only tender counted against the physical drawer.
    #[inline]
    pub const fn is_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

/// The kind of inventory movement a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Sale,
    Purchase,
    Adjustment,
    TransferIn,
    TransferOut,
    ReturnIn,
    ReturnOut,
}

impl TransactionType {
    /// Outbound movements that must never drive stock negative unless the
    /// product explicitly allows it. Corrections and transfers may.
    #[inline]
    pub const fn guards_non_negative(&self) -> bool {
        matches!(self, TransactionType::Sale | TransactionType::ReturnOut)
    }
}

/// Refund lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Completed,
    Cancelled,
}

/// Whether the refund covers the whole sale or part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum RefundType {
    Full,
    Partial,
}

/// Drawer session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DrawerStatus {
    Open,
    Counted,
    Closed,
}

/// Accounting outbox entry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Error,
    Synced,
}

/// Material return request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum MaterialReturnStatus {
    Pending,
    Accepted,
    Rejected,
}

// =============================================================================
// Product (Catalog Bridge Surface)
// =============================================================================

/// A catalog product available for sale.
///
/// `master_stock` is the store-agnostic figure non-POS consumers read; the
/// catalog bridge keeps it aligned with the per-store projections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    /// Price in cents (smallest currency unit).
    pub price_cents: i64,

    /// Unit cost in cents (margin and average-cost seeding).
    pub cost_cents: Option<i64>,

    /// Tax rate in basis points (500 = 5%).
    pub tax_rate_bps: i64,

    /// Whether inventory adjustments apply to this product.
    pub track_inventory: bool,

    /// Allow sale-type deductions to drive stock negative (backorder opt-in).
    pub allow_negative_stock: bool,

    /// Store-agnostic stock figure maintained by the catalog bridge.
    pub master_stock: i64,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Returns the unit cost as Money, if known.
    #[inline]
    pub fn cost(&self) -> Option<Money> {
        self.cost_cents.map(Money::from_cents)
    }

    /// Returns the tax rate.
    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps as u32)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A buyer. `is_company` marks wholesale/company accounts, the only buyers
/// that qualify for the cross-pool materials sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub is_company: bool,
    pub loyalty_points: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale transaction.
///
/// Invariants (checked at creation, never mutated afterwards except status):
/// - `total_cents = subtotal_cents - discount_cents + tax_cents`
/// - `change_cents = max(amount_paid_cents - total_cents, 0)`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,

    /// Day-scoped business number, e.g. `POS-20260827-0001`. Stable once
    /// issued; used as the accounting outbox reference.
    pub sale_number: String,

    /// Receipt number printed for the customer, e.g. `RCP-20260827-0001`.
    pub receipt_number: String,

    pub store_id: String,
    pub cashier_id: String,
    pub customer_id: Option<String>,

    pub status: SaleStatus,
    pub payment_status: PaymentStatus,

    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub change_cents: i64,

    /// Denormalized outbox marker for fast status display.
    pub synced_to_accounting: bool,
    pub synced_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Returns the grand total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Checks the internal balance invariant.
    pub fn is_balanced(&self) -> bool {
        self.total_cents == self.subtotal_cents - self.discount_cents + self.tax_cents
    }
}

// =============================================================================
// Sale Line Item
// =============================================================================

/// A line item in a sale.
///
/// Uses the snapshot pattern: sku, name, unit price and unit cost are frozen
/// at sale time so later catalog edits never rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleLineItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,

    /// SKU at time of sale (frozen).
    pub sku_snapshot: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,

    pub quantity: i64,
    pub unit_price_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub line_total_cents: i64,

    /// Unit cost at sale time, for margin and refund cost tracing.
    pub cost_cents: Option<i64>,
}

impl SaleLineItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A payment towards a sale. A sale owns 1..N payments (split tender).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: String,
    pub sale_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    /// External reference (card auth code, voucher number, etc.).
    pub reference: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Stock Ledger & Inventory Projection
// =============================================================================

/// An append-only record of a single inventory delta.
///
/// The ledger is the source of audit truth: for any (store, product) the sum
/// of `quantity_delta` must equal the projection's `quantity_on_hand` at
/// every committed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockLedgerEntry {
    pub id: String,
    pub store_id: String,
    pub product_id: String,
    pub transaction_type: TransactionType,
    /// Where the movement came from, e.g. ("pos_sale", "POS-20260827-0001").
    pub reference_type: String,
    pub reference_id: String,
    pub quantity_delta: i64,
    pub unit_cost_cents: Option<i64>,
    pub remarks: Option<String>,
    pub performed_by: String,
    pub performed_at: DateTime<Utc>,
}

/// Current stock per (store, product), derived from the ledger but maintained
/// incrementally for fast reads. Never written directly - only through
/// ledger-backed adjustments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryLevel {
    pub id: String,
    pub store_id: String,
    pub product_id: String,
    pub quantity_on_hand: i64,
    /// Weighted moving average, updated on positive deltas only.
    pub average_cost_cents: i64,
    pub reorder_level: i64,
    pub updated_at: DateTime<Utc>,
}

impl InventoryLevel {
    #[inline]
    pub fn average_cost(&self) -> Money {
        Money::from_cents(self.average_cost_cents)
    }

    /// Weighted-moving-average cost after receiving `delta` units at
    /// `unit_cost`. Only called for positive deltas; deductions leave the
    /// average unchanged.
    pub fn blended_cost(&self, delta: i64, unit_cost_cents: i64) -> i64 {
        let qty_before = self.quantity_on_hand.max(0);
        let qty_after = qty_before + delta;
        if qty_after <= 0 {
            return unit_cost_cents;
        }
        let blended = (qty_before as i128 * self.average_cost_cents as i128
            + delta as i128 * unit_cost_cents as i128)
            / qty_after as i128;
        blended as i64
    }
}

// =============================================================================
// Refund
// =============================================================================

/// A refund request against an original sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Refund {
    pub id: String,

    /// Day-scoped business number, e.g. `REF-20260827-0001`.
    pub refund_number: String,

    pub sale_id: String,
    pub store_id: String,
    pub refund_type: RefundType,
    pub status: RefundStatus,
    pub total_cents: i64,
    pub reason: Option<String>,

    pub requires_approval: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_notes: Option<String>,

    pub requested_by: String,
    pub created_at: DateTime<Utc>,
}

impl Refund {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A refund line item mirroring an original sale line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RefundLineItem {
    pub id: String,
    pub refund_id: String,
    /// The sale line this refund line draws down.
    pub sale_item_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub tax_cents: i64,
    pub line_total_cents: i64,
}

// =============================================================================
// Cash Drawer Session
// =============================================================================

/// A cashier's drawer session: open → counted → closed.
///
/// `expected_cents` is always recomputed at count/close time from the cash
/// payments recorded since `opened_at` - never drift-accumulated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashDrawerSession {
    pub id: String,
    pub store_id: String,
    pub cashier_id: String,
    pub status: DrawerStatus,

    pub opening_cents: i64,
    pub expected_cents: Option<i64>,
    pub counted_cents: Option<i64>,
    /// counted - expected; null until counted.
    pub difference_cents: Option<i64>,

    /// Close-time snapshots for the shift report.
    pub total_cash_sales_cents: Option<i64>,
    pub total_non_cash_sales_cents: Option<i64>,
    pub total_transactions: Option<i64>,
    pub notes: Option<String>,

    pub opened_at: DateTime<Utc>,
    pub counted_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Accounting Outbox
// =============================================================================

/// A durable queue entry for a pending accounting posting.
///
/// `reference_id` is UNIQUE: enqueueing the same reference twice is a no-op,
/// and the external consumer must look up existing postings by reference
/// before creating a new one. The same reference must never produce two
/// postings across retries, crash-recovery, or reconciliation re-runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AccountingOutboxEntry {
    pub id: String,
    pub sale_id: Option<String>,
    /// e.g. "pos_sale", "pos_refund", "pos_receipt".
    pub reference_type: String,
    /// The stable business number, e.g. "POS-20260827-0001".
    pub reference_id: String,
    /// Serialized snapshot of everything needed to post.
    pub payload: String,
    pub status: OutboxStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Materials Pool (Cross-Pool Sync)
// =============================================================================

/// Persisted mapping from a bulk material type to its catalog product.
///
/// Replaces name-based detection: a product participates in materials sync
/// only if a mapping row exists and `auto_deduct_on_sale` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MaterialMapping {
    pub id: String,
    pub material_type: String,
    pub product_id: String,
    pub auto_deduct_on_sale: bool,
    pub created_at: DateTime<Utc>,
}

/// Quantity remaining in the operations pool for one material type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MaterialPool {
    pub id: String,
    pub material_type: String,
    pub material_name: String,
    pub quantity_remaining: i64,
    pub updated_at: DateTime<Utc>,
}

/// Append-only log of operations-pool movements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MaterialMovement {
    pub id: String,
    pub material_type: String,
    pub quantity_delta: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub reference: Option<String>,
    pub performed_by: String,
    pub performed_at: DateTime<Utc>,
}

/// A material return request, resolved by explicit acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MaterialReturn {
    pub id: String,
    pub material_type: String,
    pub quantity: i64,
    pub status: MaterialReturnStatus,
    /// Quantity actually received, recorded at acceptance.
    pub actual_quantity: Option<i64>,
    pub quality_check: Option<String>,
    pub requested_by: String,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Promotion Usage
// =============================================================================

/// Post-commit record that a promotion was applied to a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PromotionUsage {
    pub id: String,
    pub promotion_id: String,
    pub sale_id: String,
    pub customer_id: Option<String>,
    pub discount_cents: i64,
    pub used_at: DateTime<Utc>,
}

// =============================================================================
// Held Sales
// =============================================================================

/// A parked cart, owned by the cashier who held it.
///
/// The draft is stored serialized; `draft_json` round-trips through the
/// hold untouched so a resumed cart rings up exactly as it was parked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct HeldSale {
    pub id: String,
    pub store_id: String,
    pub cashier_id: String,
    pub customer_id: Option<String>,
    pub draft_json: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
