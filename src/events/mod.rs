use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates a bounded event channel pair.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

// Define the various events that can occur in the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Deduction events
    StockDeducted {
        inventory_item_id: Uuid,
        store_id: Uuid,
        transaction_id: Uuid,
        delta_quantity: Decimal,
        new_quantity: Decimal,
    },
    DeductionCompleted {
        transaction_id: Uuid,
        store_id: Uuid,
        movements_created: u32,
    },
    DeductionFailed {
        transaction_id: Uuid,
        store_id: Uuid,
        reason: String,
    },

    // Mapping repair events
    MappingRepointed {
        recipe_ingredient_id: Uuid,
        old_inventory_item_id: Option<Uuid>,
        new_inventory_item_id: Uuid,
        match_score: Option<f64>,
    },
    InventoryItemSeeded {
        inventory_item_id: Uuid,
        store_id: Uuid,
        name: String,
    },
    RecipeSynthesized {
        recipe_id: Uuid,
        product_id: Uuid,
        store_id: Uuid,
        template_id: Option<Uuid>,
        needs_review: bool,
    },

    // Repair job lifecycle events
    RepairJobQueued {
        job_id: Uuid,
        store_id: Uuid,
    },
    RepairJobSucceeded {
        job_id: Uuid,
    },
    RepairJobFailed {
        job_id: Uuid,
        attempts: i32,
        last_error: String,
    },

    // Health events
    SyncHealthCritical {
        store_id: Uuid,
        failed_deductions_today: u64,
        missing_mappings: u64,
    },
}

/// Consumes engine events from the channel and reacts to them.
///
/// Most events only need structured logging here; downstream systems
/// (dashboard feeds, notifications) subscribe at the storage layer.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::DeductionFailed {
                transaction_id,
                store_id,
                reason,
            } => {
                warn!(
                    transaction_id = %transaction_id,
                    store_id = %store_id,
                    reason = %reason,
                    "Deduction failed"
                );
            }
            Event::RepairJobFailed {
                job_id,
                attempts,
                last_error,
            } => {
                error!(
                    job_id = %job_id,
                    attempts = attempts,
                    last_error = %last_error,
                    "Repair job exhausted its attempts; manual action required"
                );
            }
            Event::SyncHealthCritical {
                store_id,
                failed_deductions_today,
                missing_mappings,
            } => {
                warn!(
                    store_id = %store_id,
                    failed_deductions_today = failed_deductions_today,
                    missing_mappings = missing_mappings,
                    "Store sync health is critical"
                );
            }
            _ => {
                info!("Received event: {:?}", event);
            }
        }
    }

    info!("Event processing loop stopped");
}
