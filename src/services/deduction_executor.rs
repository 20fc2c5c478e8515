//! Stock deduction execution.
//!
//! The only component that mutates `inventory_items` during sale
//! processing. Each per-ingredient decrement runs inside its own storage
//! transaction that takes a row-level exclusive lock, re-checks
//! sufficiency under the lock, and writes the new quantity together with
//! its movement-ledger row. A stock write without its ledger row cannot
//! commit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait, QuerySelect,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::ShortfallPolicy,
    entities::{
        inventory_item::{self, Entity as InventoryItemEntity},
        inventory_movement,
        sync_outcome::{self, SyncStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::deduction_validator::{
        DeductionRequest, DeductionValidationService, ResolutionSource, ResolvedIngredient,
    },
};

/// One applied decrement, as reported back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductedItem {
    pub inventory_item_id: Uuid,
    pub ingredient_name: String,
    pub requested: Decimal,
    pub applied: Decimal,
    pub previous_quantity: Decimal,
    pub new_quantity: Decimal,
}

/// Result of a successful execute call. Per-ingredient failures never
/// surface here; they raise a request-level `ExecutionFailure` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductionOutcome {
    pub success: bool,
    pub status: String,
    pub deducted_items: Vec<DeductedItem>,
    pub movements_created: u32,
    pub warnings: Vec<String>,
}

/// Service performing stock decrements and writing the movement ledger.
#[derive(Clone)]
pub struct DeductionExecutorService {
    db: Arc<DatabaseConnection>,
    resolver: DeductionValidationService,
    event_sender: Option<EventSender>,
    shortfall_policy: ShortfallPolicy,
}

impl DeductionExecutorService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        resolver: DeductionValidationService,
        event_sender: Option<EventSender>,
        shortfall_policy: ShortfallPolicy,
    ) -> Self {
        Self {
            db,
            resolver,
            event_sender,
            shortfall_policy,
        }
    }

    /// Applies the deduction for a completed sale.
    ///
    /// Callers run `resolve_and_validate` first and only proceed on
    /// `can_proceed`; sufficiency is nevertheless re-checked here under
    /// the row lock immediately before each write, because stock may
    /// have moved since validation.
    #[instrument(skip(self, request), fields(transaction_id = %request.transaction_id, store_id = %request.store_id))]
    pub async fn execute(
        &self,
        request: &DeductionRequest,
    ) -> Result<DeductionOutcome, ServiceError> {
        let started = Instant::now();

        let (lines, mut warnings) = self.resolver.resolve(request).await?;

        let resolvable_count = lines
            .iter()
            .flat_map(|l| l.ingredients.iter())
            .filter(|i| i.inventory_item_id.is_some())
            .count();

        let mut deducted_items: Vec<DeductedItem> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for line in &lines {
            if line.source == ResolutionSource::Unresolved {
                // Resolution already recorded the warning; unmapped
                // products never block a sale, they only degrade
                // traceability.
                continue;
            }
            for ingredient in &line.ingredients {
                let Some(item_id) = ingredient.inventory_item_id else {
                    warnings.push(format!(
                        "Ingredient '{}' of product '{}' is not mapped to inventory; skipped",
                        ingredient.ingredient_name, line.product_name
                    ));
                    continue;
                };
                match self
                    .deduct_one(request.transaction_id, &line.product_name, ingredient, item_id)
                    .await
                {
                    Ok(Some(deducted)) => {
                        if deducted.applied < deducted.requested {
                            warnings.push(format!(
                                "Deduction of '{}' clamped at zero stock: requested {}, applied {}",
                                deducted.ingredient_name, deducted.requested, deducted.applied
                            ));
                        }
                        if let Some(sender) = &self.event_sender {
                            let _ = sender
                                .send(Event::StockDeducted {
                                    inventory_item_id: deducted.inventory_item_id,
                                    store_id: request.store_id,
                                    transaction_id: request.transaction_id,
                                    delta_quantity: -deducted.applied,
                                    new_quantity: deducted.new_quantity,
                                })
                                .await;
                        }
                        deducted_items.push(deducted);
                    }
                    Ok(None) => {
                        warnings.push(format!(
                            "No stock remaining for '{}'; deduction skipped",
                            ingredient.ingredient_name
                        ));
                    }
                    Err(e) => {
                        error!(
                            inventory_item_id = %item_id,
                            ingredient = %ingredient.ingredient_name,
                            error = %e,
                            "Ingredient deduction failed"
                        );
                        errors.push(format!(
                            "Deduction of '{}' failed: {}",
                            ingredient.ingredient_name, e
                        ));
                    }
                }
            }
        }

        let movements_created = deducted_items.len() as u32;
        let duration_ms = started.elapsed().as_millis() as i64;

        // A write that applied without its ledger row cannot happen (one
        // transaction covers both), but a request that resolved
        // ingredients and produced no movements at all is still a
        // critical failure of the whole request.
        let ledger_empty = resolvable_count > 0 && movements_created == 0;
        if !errors.is_empty() || ledger_empty {
            let detail = if errors.is_empty() {
                "no movement records were created for a resolvable request".to_string()
            } else {
                errors.join("; ")
            };
            self.record_outcome(
                request,
                SyncStatus::CriticalFailure,
                movements_created as i32,
                Some(detail.clone()),
                duration_ms,
            )
            .await?;
            counter!("larder_deductions_total", 1, "status" => SyncStatus::CriticalFailure.as_str());
            if let Some(sender) = &self.event_sender {
                let _ = sender
                    .send(Event::DeductionFailed {
                        transaction_id: request.transaction_id,
                        store_id: request.store_id,
                        reason: detail.clone(),
                    })
                    .await;
            }
            return Err(ServiceError::ExecutionFailure(detail));
        }

        let status = if warnings.is_empty() {
            SyncStatus::Success
        } else {
            SyncStatus::Partial
        };
        self.record_outcome(
            request,
            status,
            movements_created as i32,
            (!warnings.is_empty()).then(|| warnings.join("; ")),
            duration_ms,
        )
        .await?;

        counter!("larder_deductions_total", 1, "status" => status.as_str());
        histogram!("larder_deduction_duration_ms", duration_ms as f64);

        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::DeductionCompleted {
                    transaction_id: request.transaction_id,
                    store_id: request.store_id,
                    movements_created,
                })
                .await;
        }

        info!(
            transaction_id = %request.transaction_id,
            movements_created = movements_created,
            status = status.as_str(),
            duration_ms = duration_ms,
            "Deduction applied"
        );

        Ok(DeductionOutcome {
            success: true,
            status: status.as_str().to_string(),
            deducted_items,
            movements_created,
            warnings,
        })
    }

    /// `execute` bounded by a caller-supplied timeout. A timeout is a
    /// failure requiring repair, never a silent no-op: the outcome row is
    /// recorded so the health monitor can see it, and the caller is
    /// expected to enqueue a repair job for the transaction.
    pub async fn execute_with_timeout(
        &self,
        request: &DeductionRequest,
        timeout: Duration,
    ) -> Result<DeductionOutcome, ServiceError> {
        match tokio::time::timeout(timeout, self.execute(request)).await {
            Ok(result) => result,
            Err(_) => {
                let millis = timeout.as_millis();
                warn!(
                    transaction_id = %request.transaction_id,
                    timeout_ms = millis as u64,
                    "Deduction timed out; partially-applied movements remain in the ledger"
                );
                if let Err(e) = self
                    .record_outcome(
                        request,
                        SyncStatus::CriticalFailure,
                        0,
                        Some(format!("deduction timed out after {} ms", millis)),
                        millis as i64,
                    )
                    .await
                {
                    error!("Failed to record timeout outcome: {}", e);
                }
                if let Some(sender) = &self.event_sender {
                    let _ = sender
                        .send(Event::DeductionFailed {
                            transaction_id: request.transaction_id,
                            store_id: request.store_id,
                            reason: format!("timed out after {} ms", millis),
                        })
                        .await;
                }
                Err(ServiceError::Timeout(millis))
            }
        }
    }

    /// Decrements one inventory item and appends its ledger row, both in
    /// one transaction. The row-level exclusive lock serializes
    /// concurrent decrements of the same item; on SQLite the database
    /// write lock provides the same guarantee.
    ///
    /// Returns `Ok(None)` when the clamp policy found nothing left to
    /// deduct.
    async fn deduct_one(
        &self,
        transaction_id: Uuid,
        product_name: &str,
        ingredient: &ResolvedIngredient,
        item_id: Uuid,
    ) -> Result<Option<DeductedItem>, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let item = InventoryItemEntity::find_by_id(item_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Inventory item {} not found", item_id))
            })?;

        let required = ingredient.required_quantity;
        let available = item.quantity;

        let applied = if available >= required {
            required
        } else {
            match self.shortfall_policy {
                ShortfallPolicy::Reject => {
                    return Err(ServiceError::InsufficientStock(format!(
                        "'{}': required {}, available {}",
                        ingredient.ingredient_name, required, available
                    )));
                }
                ShortfallPolicy::Clamp => available,
            }
        };

        if applied == Decimal::ZERO {
            txn.rollback().await.map_err(ServiceError::db_error)?;
            return Ok(None);
        }

        let previous = available;
        let new_quantity = previous - applied;
        let now = Utc::now();

        let mut active: inventory_item::ActiveModel = item.into();
        active.quantity = Set(new_quantity);
        active.updated_at = Set(now);
        active.update(&txn).await.map_err(ServiceError::db_error)?;

        let movement = inventory_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            inventory_item_id: Set(item_id),
            reference_id: Set(transaction_id),
            delta_quantity: Set(-applied),
            previous_quantity: Set(previous),
            new_quantity: Set(new_quantity),
            note: Set(Some(format!("sale of '{}'", product_name))),
            created_at: Set(now),
        };
        movement.insert(&txn).await.map_err(|e| {
            error!("Failed to append movement record: {}", e);
            ServiceError::db_error(e)
        })?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        Ok(Some(DeductedItem {
            inventory_item_id: item_id,
            ingredient_name: ingredient.ingredient_name.clone(),
            requested: required,
            applied,
            previous_quantity: previous,
            new_quantity,
        }))
    }

    /// Records a validation-rejected attempt so the health monitor sees
    /// it; nothing was executed, but the deduction was attempted.
    pub async fn record_rejection(
        &self,
        request: &DeductionRequest,
        details: &str,
    ) -> Result<(), ServiceError> {
        self.record_outcome(
            request,
            SyncStatus::CriticalFailure,
            0,
            Some(details.to_string()),
            0,
        )
        .await?;
        counter!("larder_deductions_total", 1, "status" => SyncStatus::CriticalFailure.as_str());
        Ok(())
    }

    /// Appends one SyncOutcome row for this attempt.
    async fn record_outcome(
        &self,
        request: &DeductionRequest,
        status: SyncStatus,
        items_processed: i32,
        error_details: Option<String>,
        duration_ms: i64,
    ) -> Result<(), ServiceError> {
        let outcome = sync_outcome::ActiveModel {
            id: Set(Uuid::new_v4()),
            transaction_id: Set(request.transaction_id),
            store_id: Set(request.store_id),
            status: Set(status.as_str().to_string()),
            items_processed: Set(items_processed),
            error_details: Set(error_details),
            duration_ms: Set(duration_ms),
            created_at: Set(Utc::now()),
        };
        outcome
            .insert(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(())
    }
}
