use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use ticketflow_core::ledger::{LedgerError, LedgerStore};
use ticketflow_core::{EventValidationError, TicketEvent};

/// Capacity bookkeeping for events.
///
/// Stateless over the ledger: every mutation runs as an optimistic
/// compare-and-swap loop on the event's versioned counts, so concurrent
/// callers on the same event serialize here and can never both consume the
/// last ticket. Different events proceed fully in parallel.
pub struct InventoryManager {
    ledger: Arc<dyn LedgerStore>,
}

impl InventoryManager {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Register a new event with full availability
    pub async fn initialize(&self, event: TicketEvent) -> Result<TicketEvent, InventoryError> {
        self.ledger.insert_event(&event).await?;
        Ok(event)
    }

    pub async fn get(&self, event_id: Uuid) -> Result<Option<TicketEvent>, InventoryError> {
        Ok(self.ledger.load_event(event_id).await?.map(|v| v.value))
    }

    /// Earmark `quantity` tickets against a pending sale. The tickets are
    /// no longer available but not yet counted as sold.
    pub async fn reserve(&self, event_id: Uuid, quantity: u32) -> Result<TicketEvent, InventoryError> {
        self.mutate(event_id, |event| {
            if event.available < quantity {
                return Err(InventoryError::InsufficientCapacity {
                    requested: quantity,
                    available: event.available,
                });
            }
            event.available -= quantity;
            event.reserved += quantity;
            Ok(())
        })
        .await
    }

    /// Convert a prior reservation into sold tickets on payment success.
    /// Only reachable with a matching reservation outstanding.
    pub async fn commit(&self, event_id: Uuid, quantity: u32) -> Result<TicketEvent, InventoryError> {
        self.mutate(event_id, |event| {
            assert!(
                event.reserved >= quantity,
                "commit of {} tickets without matching reservation on event {} (reserved={})",
                quantity,
                event.id,
                event.reserved
            );
            event.reserved -= quantity;
            event.sold += quantity;
            Ok(())
        })
        .await
    }

    /// Return an abandoned reservation to availability
    pub async fn release(&self, event_id: Uuid, quantity: u32) -> Result<TicketEvent, InventoryError> {
        self.mutate(event_id, |event| {
            assert!(
                event.reserved >= quantity,
                "release of {} tickets without matching reservation on event {} (reserved={})",
                quantity,
                event.id,
                event.reserved
            );
            event.reserved -= quantity;
            event.available += quantity;
            Ok(())
        })
        .await
    }

    /// Refund variant: sold tickets go back on sale
    pub async fn release_sold(
        &self,
        event_id: Uuid,
        quantity: u32,
    ) -> Result<TicketEvent, InventoryError> {
        self.mutate(event_id, |event| {
            assert!(
                event.sold >= quantity,
                "refund of {} tickets exceeds sold count on event {} (sold={})",
                quantity,
                event.id,
                event.sold
            );
            event.sold -= quantity;
            event.available += quantity;
            Ok(())
        })
        .await
    }

    /// CAS retry loop: load versioned counts, apply, write back. A lost
    /// race reloads and revalidates against the fresh counts.
    async fn mutate<F>(&self, event_id: Uuid, apply: F) -> Result<TicketEvent, InventoryError>
    where
        F: Fn(&mut TicketEvent) -> Result<(), InventoryError>,
    {
        loop {
            let stored = self
                .ledger
                .load_event(event_id)
                .await?
                .ok_or_else(|| InventoryError::NotFound(event_id.to_string()))?;

            let mut event = stored.value;
            apply(&mut event)?;

            // Corrupted counts mean a mis-sequenced commit/release slipped
            // past the lifecycle guards; not a recoverable condition.
            assert!(
                event.counts_consistent(),
                "inventory invariant broken for event {}: available={} reserved={} sold={} capacity={}",
                event.id,
                event.available,
                event.reserved,
                event.sold,
                event.capacity
            );

            if self.ledger.store_event(&event, stored.version).await? {
                return Ok(event);
            }
            debug!(event_id = %event_id, "lost inventory write race, retrying");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Event not found: {0}")]
    NotFound(String),

    #[error("Insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: u32, available: u32 },

    #[error("Invalid event: {0}")]
    Validation(#[from] EventValidationError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
