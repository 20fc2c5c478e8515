//! Mapping validation and repair.
//!
//! Recipes and inventory are maintained independently, so two defect
//! classes accumulate over time: ingredient references that resolve to
//! nothing, and references that point at an item belonging to a
//! different store than the recipe. This service detects both (read-only)
//! and repairs them item by item, never letting one failed fix block the
//! rest.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        inventory_item::{self, Entity as InventoryItemEntity},
        recipe::{self, Entity as RecipeEntity},
        recipe_ingredient::{self, Entity as RecipeIngredientEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::matcher::{self, MatchPolicy},
    services::normalize::normalize_unit,
};

/// A recipe ingredient whose reference points at another store's item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossStoreDefect {
    pub recipe_id: Uuid,
    pub recipe_store_id: Uuid,
    pub ingredient_id: Uuid,
    pub ingredient_name: String,
    pub unit: String,
    pub inventory_item_id: Uuid,
    pub item_store_id: Uuid,
}

/// A recipe ingredient whose non-null reference resolves to nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingMappingDefect {
    pub recipe_id: Uuid,
    pub store_id: Uuid,
    pub ingredient_id: Uuid,
    pub ingredient_name: String,
    pub unit: String,
    pub inventory_item_id: Uuid,
}

/// Output of a validation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingValidationReport {
    pub cross_store: Vec<CrossStoreDefect>,
    pub missing: Vec<MissingMappingDefect>,
}

impl MappingValidationReport {
    pub fn is_clean(&self) -> bool {
        self.cross_store.is_empty() && self.missing.is_empty()
    }

    pub fn defect_count(&self) -> usize {
        self.cross_store.len() + self.missing.len()
    }
}

/// Tally of an attempted repair pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingFixSummary {
    pub fixed: u32,
    pub failed: u32,
    pub details: Vec<String>,
}

/// Service detecting and repairing ingredient-to-inventory mapping
/// defects.
#[derive(Clone)]
pub struct MappingValidationService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    bulk_threshold: f64,
}

impl MappingValidationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self {
            db,
            event_sender,
            bulk_threshold: MatchPolicy::Bulk.default_threshold(),
        }
    }

    pub fn with_bulk_threshold(mut self, threshold: f64) -> Self {
        self.bulk_threshold = threshold;
        self
    }

    /// Scans active recipes (optionally for one store) and reports every
    /// cross-store and dangling ingredient reference. Read-only.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        store_id: Option<Uuid>,
    ) -> Result<MappingValidationReport, ServiceError> {
        let db = &*self.db;

        let mut recipe_query = RecipeEntity::find().filter(recipe::Column::Active.eq(true));
        if let Some(store_id) = store_id {
            recipe_query = recipe_query.filter(recipe::Column::StoreId.eq(store_id));
        }
        let recipes = recipe_query.all(db).await.map_err(|e| {
            error!("Failed to fetch recipes for validation: {}", e);
            ServiceError::db_error(e)
        })?;

        if recipes.is_empty() {
            return Ok(MappingValidationReport::default());
        }

        let recipe_ids: Vec<Uuid> = recipes.iter().map(|r| r.id).collect();
        let store_by_recipe: HashMap<Uuid, Uuid> =
            recipes.iter().map(|r| (r.id, r.store_id)).collect();

        let ingredients = RecipeIngredientEntity::find()
            .filter(recipe_ingredient::Column::RecipeId.is_in(recipe_ids))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

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

        let mut report = MappingValidationReport::default();
        for ingredient in &ingredients {
            let Some(item_id) = ingredient.inventory_item_id else {
                // Null references are untracked ingredients, not defects;
                // the deduction validator downgrades them to warnings.
                continue;
            };
            let recipe_store = store_by_recipe[&ingredient.recipe_id];
            match referenced_items.get(&item_id) {
                Some(item) if item.store_id != recipe_store => {
                    report.cross_store.push(CrossStoreDefect {
                        recipe_id: ingredient.recipe_id,
                        recipe_store_id: recipe_store,
                        ingredient_id: ingredient.id,
                        ingredient_name: ingredient.ingredient_name.clone(),
                        unit: ingredient.unit.clone(),
                        inventory_item_id: item_id,
                        item_store_id: item.store_id,
                    });
                }
                Some(_) => {}
                None => {
                    report.missing.push(MissingMappingDefect {
                        recipe_id: ingredient.recipe_id,
                        store_id: recipe_store,
                        ingredient_id: ingredient.id,
                        ingredient_name: ingredient.ingredient_name.clone(),
                        unit: ingredient.unit.clone(),
                        inventory_item_id: item_id,
                    });
                }
            }
        }

        if !report.is_clean() {
            warn!(
                cross_store = report.cross_store.len(),
                missing = report.missing.len(),
                "Mapping validation found defects"
            );
        }

        Ok(report)
    }

    /// Repairs every defect in the report independently: match against
    /// the correct store's inventory, repoint on success, otherwise seed
    /// a zero-quantity item there and point at it. One failure never
    /// blocks the remaining fixes.
    #[instrument(skip(self, report), fields(defects = report.defect_count()))]
    pub async fn fix(
        &self,
        report: &MappingValidationReport,
    ) -> Result<MappingFixSummary, ServiceError> {
        let mut summary = MappingFixSummary::default();

        for defect in &report.cross_store {
            match self
                .repoint_ingredient(
                    defect.ingredient_id,
                    defect.recipe_store_id,
                    &defect.ingredient_name,
                    &defect.unit,
                    Some(defect.inventory_item_id),
                )
                .await
            {
                Ok(new_item_id) => {
                    summary.fixed += 1;
                    summary.details.push(format!(
                        "cross-store: ingredient '{}' of recipe {} repointed from item {} (store {}) to item {} (store {})",
                        defect.ingredient_name,
                        defect.recipe_id,
                        defect.inventory_item_id,
                        defect.item_store_id,
                        new_item_id,
                        defect.recipe_store_id,
                    ));
                }
                Err(e) => {
                    summary.failed += 1;
                    summary.details.push(format!(
                        "cross-store: ingredient '{}' of recipe {} could not be repaired: {}",
                        defect.ingredient_name, defect.recipe_id, e
                    ));
                    error!(
                        ingredient_id = %defect.ingredient_id,
                        error = %e,
                        "Cross-store mapping fix failed"
                    );
                }
            }
        }

        for defect in &report.missing {
            match self
                .repoint_ingredient(
                    defect.ingredient_id,
                    defect.store_id,
                    &defect.ingredient_name,
                    &defect.unit,
                    Some(defect.inventory_item_id),
                )
                .await
            {
                Ok(new_item_id) => {
                    summary.fixed += 1;
                    summary.details.push(format!(
                        "missing: ingredient '{}' of recipe {} repointed to item {}",
                        defect.ingredient_name, defect.recipe_id, new_item_id,
                    ));
                }
                Err(e) => {
                    summary.failed += 1;
                    summary.details.push(format!(
                        "missing: ingredient '{}' of recipe {} could not be repaired: {}",
                        defect.ingredient_name, defect.recipe_id, e
                    ));
                    error!(
                        ingredient_id = %defect.ingredient_id,
                        error = %e,
                        "Missing mapping fix failed"
                    );
                }
            }
        }

        info!(
            fixed = summary.fixed,
            failed = summary.failed,
            "Mapping repair pass complete"
        );

        Ok(summary)
    }

    /// Points one ingredient at an item in the given store, matching
    /// against its inventory first and seeding a new zero-quantity item
    /// when nothing matches. Returns the new reference target.
    pub(crate) async fn repoint_ingredient(
        &self,
        ingredient_id: Uuid,
        store_id: Uuid,
        ingredient_name: &str,
        unit: &str,
        old_inventory_item_id: Option<Uuid>,
    ) -> Result<Uuid, ServiceError> {
        let db = &*self.db;

        let candidates = InventoryItemEntity::find()
            .filter(inventory_item::Column::StoreId.eq(store_id))
            .filter(inventory_item::Column::Active.eq(true))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let matched = matcher::best_match_with_threshold(
            ingredient_name,
            Some(unit),
            &candidates,
            self.bulk_threshold,
        );

        let (target_id, match_score) = match matched {
            Some(candidate) => (candidate.item.id, Some(candidate.score)),
            None => {
                let item_id = self
                    .seed_inventory_item(store_id, ingredient_name, unit)
                    .await?;
                (item_id, None)
            }
        };

        let ingredient = RecipeIngredientEntity::find_by_id(ingredient_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Recipe ingredient {} not found", ingredient_id))
            })?;

        let mut active: recipe_ingredient::ActiveModel = ingredient.into();
        active.inventory_item_id = Set(Some(target_id));
        active.updated_at = Set(Utc::now());
        active.update(db).await.map_err(ServiceError::db_error)?;

        info!(
            ingredient_id = %ingredient_id,
            store_id = %store_id,
            new_item_id = %target_id,
            score = ?match_score,
            "Ingredient mapping repointed"
        );

        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::MappingRepointed {
                    recipe_ingredient_id: ingredient_id,
                    old_inventory_item_id,
                    new_inventory_item_id: target_id,
                    match_score,
                })
                .await;
        }

        Ok(target_id)
    }

    /// Creates a zero-quantity inventory item so the mapping has a valid
    /// same-store target; stock arrives later through restock.
    async fn seed_inventory_item(
        &self,
        store_id: Uuid,
        name: &str,
        unit: &str,
    ) -> Result<Uuid, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();
        let item = inventory_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(store_id),
            name: Set(name.to_string()),
            unit: Set(normalize_unit(unit)),
            quantity: Set(rust_decimal::Decimal::ZERO),
            minimum_threshold: Set(rust_decimal::Decimal::ZERO),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = item.insert(db).await.map_err(|e| {
            error!("Failed to seed inventory item: {}", e);
            ServiceError::db_error(e)
        })?;

        info!(
            item_id = %created.id,
            store_id = %store_id,
            name = %created.name,
            "Seeded zero-quantity inventory item for unmatched ingredient"
        );

        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::InventoryItemSeeded {
                    inventory_item_id: created.id,
                    store_id,
                    name: created.name.clone(),
                })
                .await;
        }

        Ok(created.id)
    }
}
