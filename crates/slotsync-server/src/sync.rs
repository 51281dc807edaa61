//! Inventory persistence sink.
//!
//! Bridges the rate-limited fetcher to the database: each fetched day's slot
//! payload is written through [`slotsync_db::insert_slot_graph`].

use std::convert::Infallible;
use std::future::Future;

use chrono::NaiveDate;
use slotsync_core::SlotPayload;
use slotsync_provider::InventorySink;
use sqlx::PgPool;

/// Persists fetched inventory payloads into the store.
#[derive(Clone)]
pub struct InventorySyncer {
    pool: PgPool,
}

impl InventorySyncer {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl InventorySink for InventorySyncer {
    // A persistence error on one slot is logged and that slot is skipped;
    // the payload as a whole never fails, so already-stored slots stand.
    type Error = Infallible;

    fn save_inventory(
        &self,
        product_id: i64,
        date: NaiveDate,
        slots: &[SlotPayload],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move {
            let mut stored = 0usize;
            let mut skipped = 0usize;

            for slot in slots {
                match slotsync_db::insert_slot_graph(&self.pool, product_id, slot).await {
                    Ok(_) => stored += 1,
                    Err(error) => {
                        skipped += 1;
                        tracing::error!(
                            product_id,
                            provider_slot_id = slot.provider_slot_id,
                            %error,
                            "failed to persist slot; skipping"
                        );
                    }
                }
            }

            tracing::info!(product_id, %date, stored, skipped, "inventory payload persisted");
            Ok(())
        }
    }
}
