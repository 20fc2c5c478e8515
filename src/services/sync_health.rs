//! Per-store sync health aggregation.
//!
//! Derives a store's mapping completeness, stock pressure, and recent
//! deduction failure rate into one classified status. The status itself
//! is never persisted; it is recomputed on demand or on the monitor
//! interval. Critical stores trigger bulk repair; warning stores only
//! produce a recommendation list.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        inventory_item::{self, Entity as InventoryItemEntity},
        recipe::{self, Entity as RecipeEntity},
        recipe_ingredient::{self, Entity as RecipeIngredientEntity},
        sync_outcome::{self, Entity as SyncOutcomeEntity, SyncStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::repair::RepairService,
};

/// Overall classification of a store's sync health.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Warning,
    Critical,
}

impl HealthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Healthy => "healthy",
            HealthLevel::Warning => "warning",
            HealthLevel::Critical => "critical",
        }
    }
}

/// Classification thresholds, taken from `EngineConfig`.
#[derive(Clone, Copy, Debug)]
pub struct HealthThresholds {
    pub missing_mapping_warning: u64,
    pub failed_deduction_critical: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            missing_mapping_warning: 5,
            failed_deduction_critical: 3,
        }
    }
}

/// Derived, per-store health view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncHealthStatus {
    pub store_id: Uuid,
    pub total_products: u64,
    pub valid_products: u64,
    pub invalid_products: u64,
    pub missing_mappings: u64,
    pub cross_store_mappings: u64,
    pub low_stock_items: u64,
    pub out_of_stock_items: u64,
    pub recent_failure_count: u64,
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    pub level: HealthLevel,
    pub recommendations: Vec<String>,
}

/// Service computing per-store health and triggering bulk remediation.
#[derive(Clone)]
pub struct SyncHealthService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    thresholds: HealthThresholds,
}

impl SyncHealthService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Option<EventSender>,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            db,
            event_sender,
            thresholds,
        }
    }

    /// Computes the current health view for one store.
    #[instrument(skip(self))]
    pub async fn health_for_store(
        &self,
        store_id: Uuid,
    ) -> Result<SyncHealthStatus, ServiceError> {
        let db = &*self.db;

        let recipes = RecipeEntity::find()
            .filter(recipe::Column::StoreId.eq(store_id))
            .filter(recipe::Column::Active.eq(true))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let recipe_ids: Vec<Uuid> = recipes.iter().map(|r| r.id).collect();
        let ingredients = if recipe_ids.is_empty() {
            Vec::new()
        } else {
            RecipeIngredientEntity::find()
                .filter(recipe_ingredient::Column::RecipeId.is_in(recipe_ids))
                .all(db)
                .await
                .map_err(ServiceError::db_error)?
        };

        let referenced_ids: Vec<Uuid> = ingredients
            .iter()
            .filter_map(|i| i.inventory_item_id)
            .collect();
        let referenced_items: HashMap<Uuid, inventory_item::Model> = if referenced_ids.is_empty() {
            HashMap::new()
        } else {
            InventoryItemEntity::find()
                .filter(inventory_item::Column::Id.is_in(referenced_ids))
                .all(db)
                .await
                .map_err(ServiceError::db_error)?
                .into_iter()
                .map(|item| (item.id, item))
                .collect()
        };

        let mut missing_mappings = 0u64;
        let mut cross_store_mappings = 0u64;
        let mut ingredients_by_recipe: HashMap<Uuid, Vec<&recipe_ingredient::Model>> =
            HashMap::new();
        for ingredient in &ingredients {
            ingredients_by_recipe
                .entry(ingredient.recipe_id)
                .or_default()
                .push(ingredient);
            match ingredient.inventory_item_id {
                None => missing_mappings += 1,
                Some(item_id) => match referenced_items.get(&item_id) {
                    None => missing_mappings += 1,
                    Some(item) if item.store_id != store_id => cross_store_mappings += 1,
                    Some(_) => {}
                },
            }
        }

        let total_products = recipes.len() as u64;
        let valid_products = recipes
            .iter()
            .filter(|r| {
                if r.needs_review {
                    return false;
                }
                match ingredients_by_recipe.get(&r.id) {
                    None => false,
                    Some(list) => {
                        !list.is_empty()
                            && list.iter().all(|i| {
                                i.inventory_item_id
                                    .and_then(|id| referenced_items.get(&id))
                                    .map(|item| item.store_id == store_id)
                                    .unwrap_or(false)
                            })
                    }
                }
            })
            .count() as u64;
        let invalid_products = total_products - valid_products;

        let items = InventoryItemEntity::find()
            .filter(inventory_item::Column::StoreId.eq(store_id))
            .filter(inventory_item::Column::Active.eq(true))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;
        let out_of_stock_items = items
            .iter()
            .filter(|i| i.quantity == Decimal::ZERO)
            .count() as u64;
        let low_stock_items = items
            .iter()
            .filter(|i| {
                i.quantity > Decimal::ZERO
                    && i.minimum_threshold > Decimal::ZERO
                    && i.quantity <= i.minimum_threshold
            })
            .count() as u64;

        let day_start = Utc::now()
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();
        let recent_failure_count = SyncOutcomeEntity::find()
            .filter(sync_outcome::Column::StoreId.eq(store_id))
            .filter(sync_outcome::Column::Status.ne(SyncStatus::Success.as_str()))
            .filter(sync_outcome::Column::CreatedAt.gte(day_start))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        let last_successful_sync_at = SyncOutcomeEntity::find()
            .filter(sync_outcome::Column::StoreId.eq(store_id))
            .filter(sync_outcome::Column::Status.eq(SyncStatus::Success.as_str()))
            .order_by_desc(sync_outcome::Column::CreatedAt)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .map(|o| o.created_at);

        let mut recommendations = Vec::new();
        if cross_store_mappings > 0 {
            recommendations.push(format!(
                "{} ingredient mappings point at another store's inventory; run mapping repair",
                cross_store_mappings
            ));
        }
        if missing_mappings > 0 {
            recommendations.push(format!(
                "{} ingredients are unmapped or dangling; map them to inventory items",
                missing_mappings
            ));
        }
        if invalid_products > 0 {
            recommendations.push(format!(
                "{} of {} products with recipes are not fully mapped",
                invalid_products, total_products
            ));
        }
        if out_of_stock_items > 0 {
            recommendations.push(format!("{} items are out of stock", out_of_stock_items));
        }
        if low_stock_items > 0 {
            recommendations.push(format!(
                "{} items are at or below their minimum threshold",
                low_stock_items
            ));
        }

        // Cross-store references are always warning-worthy; plain
        // missing mappings only past the configured threshold.
        let level = if recent_failure_count > self.thresholds.failed_deduction_critical {
            HealthLevel::Critical
        } else if missing_mappings > self.thresholds.missing_mapping_warning
            || cross_store_mappings > 0
            || low_stock_items + out_of_stock_items > 0
        {
            HealthLevel::Warning
        } else {
            HealthLevel::Healthy
        };

        if level == HealthLevel::Critical {
            warn!(
                store_id = %store_id,
                failures_today = recent_failure_count,
                "Store classified as critical"
            );
            if let Some(sender) = &self.event_sender {
                let _ = sender
                    .send(Event::SyncHealthCritical {
                        store_id,
                        failed_deductions_today: recent_failure_count,
                        missing_mappings,
                    })
                    .await;
            }
        }

        Ok(SyncHealthStatus {
            store_id,
            total_products,
            valid_products,
            invalid_products,
            missing_mappings,
            cross_store_mappings,
            low_stock_items,
            out_of_stock_items,
            recent_failure_count,
            last_successful_sync_at,
            level,
            recommendations,
        })
    }

    /// Computes health for every store that has recipes or recorded
    /// outcomes.
    pub async fn check_all_stores(&self) -> Result<Vec<SyncHealthStatus>, ServiceError> {
        let db = &*self.db;

        let recipe_stores: Vec<Uuid> = RecipeEntity::find()
            .select_only()
            .column(recipe::Column::StoreId)
            .distinct()
            .into_tuple()
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;
        let outcome_stores: Vec<Uuid> = SyncOutcomeEntity::find()
            .select_only()
            .column(sync_outcome::Column::StoreId)
            .distinct()
            .into_tuple()
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let stores: BTreeSet<Uuid> = recipe_stores
            .into_iter()
            .chain(outcome_stores.into_iter())
            .collect();

        let mut statuses = Vec::with_capacity(stores.len());
        for store_id in stores {
            statuses.push(self.health_for_store(store_id).await?);
        }
        Ok(statuses)
    }

    /// Bulk remediation for a critical store: queues a repair job for
    /// every product whose recipe is not fully mapped. Returns the
    /// number of jobs queued.
    #[instrument(skip(self, repair))]
    pub async fn remediate(
        &self,
        store_id: Uuid,
        repair: &RepairService,
    ) -> Result<u32, ServiceError> {
        let db = &*self.db;

        let recipes = RecipeEntity::find()
            .filter(recipe::Column::StoreId.eq(store_id))
            .filter(recipe::Column::Active.eq(true))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut queued = 0u32;
        for r in recipes {
            let ingredients = RecipeIngredientEntity::find()
                .filter(recipe_ingredient::Column::RecipeId.eq(r.id))
                .all(db)
                .await
                .map_err(ServiceError::db_error)?;

            let mut fully_mapped = !r.needs_review && !ingredients.is_empty();
            if fully_mapped {
                for ingredient in &ingredients {
                    let Some(item_id) = ingredient.inventory_item_id else {
                        fully_mapped = false;
                        break;
                    };
                    let item = InventoryItemEntity::find_by_id(item_id)
                        .one(db)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if item.map(|i| i.store_id != store_id).unwrap_or(true) {
                        fully_mapped = false;
                        break;
                    }
                }
            }

            if !fully_mapped {
                repair
                    .enqueue_for_product(store_id, r.product_id, &r.name, "sync health remediation")
                    .await?;
                queued += 1;
            }
        }

        info!(store_id = %store_id, queued = queued, "Bulk remediation queued");
        Ok(queued)
    }
}

/// Spawns a background loop that evaluates every store on an interval
/// and triggers bulk remediation for critical ones.
pub fn spawn_health_monitor(
    health: Arc<SyncHealthService>,
    repair: Arc<RepairService>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Sync health monitor started");
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let statuses = match health.check_all_stores().await {
                Ok(statuses) => statuses,
                Err(e) => {
                    error!("Health check pass failed: {}", e);
                    continue;
                }
            };
            for status in statuses {
                if status.level == HealthLevel::Critical {
                    if let Err(e) = health.remediate(status.store_id, &repair).await {
                        error!(
                            store_id = %status.store_id,
                            error = %e,
                            "Bulk remediation failed"
                        );
                    }
                }
            }
        }
    })
}
