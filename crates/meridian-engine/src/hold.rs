//! # Held Sales
//!
//! Park an in-progress cart and bring it back later. A hold is the
//! serialized draft, nothing more; no stock moves and no money is taken
//! until the resumed draft goes through `SaleManager::create_sale`.
//!
//! Holds belong to the cashier who parked them. Resuming consumes the
//! hold, so the same cart cannot be rung up twice from the shelf.

use std::sync::Arc;
use tracing::{info, instrument};

use meridian_core::{validate_ref, HeldSale, SaleDraft, ValidationError};
use meridian_db::Database;

use crate::error::EngineResult;

/// Parks and resumes carts for the terminal's cashiers.
#[derive(Clone)]
pub struct HoldManager {
    db: Arc<Database>,
}

impl HoldManager {
    pub fn new(db: Arc<Database>) -> Self {
        HoldManager { db }
    }

    /// Parks a draft. An empty cart cannot be held.
    #[instrument(skip(self, draft), fields(store_id = %draft.store_id, cashier_id = %draft.cashier_id))]
    pub async fn hold(&self, draft: &SaleDraft, notes: Option<String>) -> EngineResult<HeldSale> {
        validate_ref("store_id", &draft.store_id)?;
        validate_ref("cashier_id", &draft.cashier_id)?;
        if draft.items.is_empty() {
            return Err(ValidationError::NoLineItems.into());
        }

        let draft_json = serde_json::to_string(draft)?;
        let hold = self
            .db
            .holds()
            .insert(
                &draft.store_id,
                &draft.cashier_id,
                draft.customer_id.as_deref(),
                &draft_json,
                notes.as_deref(),
            )
            .await?;

        info!(hold_id = %hold.id, items = draft.items.len(), "Sale parked");
        Ok(hold)
    }

    /// The cashier's parked carts on a store, newest first.
    pub async fn list(&self, store_id: &str, cashier_id: &str) -> EngineResult<Vec<HeldSale>> {
        Ok(self.db.holds().list_for_cashier(store_id, cashier_id).await?)
    }

    /// Takes a hold off the shelf: returns its draft and removes the row.
    /// Only the holding cashier can resume it.
    #[instrument(skip(self))]
    pub async fn resume(&self, hold_id: &str, cashier_id: &str) -> EngineResult<SaleDraft> {
        let hold = self.db.holds().get_for_cashier(hold_id, cashier_id).await?;
        let draft: SaleDraft = serde_json::from_str(&hold.draft_json)?;
        self.db.holds().delete(hold_id, cashier_id).await?;

        info!(hold_id, cashier_id, "Held sale resumed");
        Ok(draft)
    }

    /// Throws a hold away without ringing it up.
    #[instrument(skip(self))]
    pub async fn discard(&self, hold_id: &str, cashier_id: &str) -> EngineResult<()> {
        self.db.holds().delete(hold_id, cashier_id).await?;
        info!(hold_id, cashier_id, "Held sale discarded");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
