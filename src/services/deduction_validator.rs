//! Sale-to-ingredient resolution and stock sufficiency checks.
//!
//! Resolution priority per line item: an active recipe with ingredients,
//! else a direct inventory-item match on the product name (products
//! without recipes are atomic inventory units). Items that resolve to
//! nothing produce warnings rather than errors so a data-entry gap never
//! blocks the checkout path.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        inventory_item::{self, Entity as InventoryItemEntity},
        recipe::{self, Entity as RecipeEntity},
        recipe_ingredient::{self, Entity as RecipeIngredientEntity},
    },
    errors::ServiceError,
    services::matcher::{self, MatchPolicy},
};

/// One sold product inside a deduction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: Decimal,
}

/// Ephemeral input created once per completed sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductionRequest {
    pub transaction_id: Uuid,
    pub store_id: Uuid,
    pub line_items: Vec<LineItem>,
}

/// Where a line item's ingredient list came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionSource {
    /// An active recipe with at least one ingredient.
    Recipe(Uuid),
    /// The product matched an inventory item directly (no recipe).
    DirectItem(Uuid),
    /// No recipe and no direct match; the line is skipped with a warning.
    Unresolved,
}

/// One raw material requirement, already multiplied by the line quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedIngredient {
    pub inventory_item_id: Option<Uuid>,
    pub ingredient_name: String,
    pub unit: String,
    pub required_quantity: Decimal,
}

/// A line item with its resolved ingredient list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub source: ResolutionSource,
    pub ingredients: Vec<ResolvedIngredient>,
}

/// An ingredient whose requirement exceeds current stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsufficientEntry {
    pub inventory_item_id: Uuid,
    pub ingredient_name: String,
    pub required: Decimal,
    pub available: Decimal,
}

/// Validation verdict handed to the caller and to the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductionValidation {
    pub can_proceed: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub insufficient_items: Vec<InsufficientEntry>,
    pub resolved_lines: Vec<ResolvedLine>,
}

/// Service resolving sale line items to ingredient requirements and
/// checking on-hand sufficiency. Read-only.
#[derive(Clone)]
pub struct DeductionValidationService {
    db: Arc<DatabaseConnection>,
    direct_match_threshold: f64,
}

impl DeductionValidationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            direct_match_threshold: MatchPolicy::Bulk.default_threshold(),
        }
    }

    pub fn with_direct_match_threshold(mut self, threshold: f64) -> Self {
        self.direct_match_threshold = threshold;
        self
    }

    /// Resolves every line item to its ingredient list without judging
    /// sufficiency. Returns the resolved lines plus resolution warnings.
    ///
    /// Rejects structurally invalid requests (no line items, non-positive
    /// quantities); those are caller bugs, not stock conditions.
    pub async fn resolve(
        &self,
        request: &DeductionRequest,
    ) -> Result<(Vec<ResolvedLine>, Vec<String>), ServiceError> {
        if request.line_items.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Deduction request has no line items".to_string(),
            ));
        }

        let mut warnings = Vec::new();
        let mut resolved_lines = Vec::with_capacity(request.line_items.len());

        for line in &request.line_items {
            if line.quantity <= Decimal::ZERO {
                return Err(ServiceError::InvalidInput(format!(
                    "Line item '{}' has non-positive quantity {}",
                    line.product_name, line.quantity
                )));
            }
            let resolved = self.resolve_line(request.store_id, line).await?;
            if resolved.source == ResolutionSource::Unresolved {
                warnings.push(format!(
                    "Product '{}' has no recipe and no matching inventory item; line will be skipped",
                    line.product_name
                ));
            }
            resolved_lines.push(resolved);
        }

        Ok((resolved_lines, warnings))
    }

    /// Resolves every line item and checks stock sufficiency.
    ///
    /// Shortfalls are blocking errors; unmapped or unresolvable
    /// ingredients are warnings. `can_proceed` is true iff there are no
    /// blocking errors.
    #[instrument(skip(self, request), fields(transaction_id = %request.transaction_id, store_id = %request.store_id))]
    pub async fn resolve_and_validate(
        &self,
        request: &DeductionRequest,
    ) -> Result<DeductionValidation, ServiceError> {
        let (resolved_lines, mut warnings) = self.resolve(request).await?;
        let mut errors = Vec::new();
        let mut insufficient_items = Vec::new();

        // Sufficiency check over every mapped ingredient, one fetch for
        // the whole request.
        let referenced_ids: Vec<Uuid> = resolved_lines
            .iter()
            .flat_map(|l| l.ingredients.iter())
            .filter_map(|i| i.inventory_item_id)
            .collect();

        let items_by_id: HashMap<Uuid, inventory_item::Model> = if referenced_ids.is_empty() {
            HashMap::new()
        } else {
            InventoryItemEntity::find()
                .filter(inventory_item::Column::Id.is_in(referenced_ids))
                .all(&*self.db)
                .await
                .map_err(|e| {
                    error!("Failed to fetch inventory items for validation: {}", e);
                    ServiceError::db_error(e)
                })?
                .into_iter()
                .map(|item| (item.id, item))
                .collect()
        };

        for line in &resolved_lines {
            for ingredient in &line.ingredients {
                let Some(item_id) = ingredient.inventory_item_id else {
                    warnings.push(format!(
                        "Ingredient '{}' of product '{}' is not mapped to inventory; it will not be tracked",
                        ingredient.ingredient_name, line.product_name
                    ));
                    continue;
                };
                match items_by_id.get(&item_id) {
                    Some(item) => {
                        if item.quantity < ingredient.required_quantity {
                            errors.push(format!(
                                "Insufficient stock for '{}': required {}, available {}",
                                ingredient.ingredient_name,
                                ingredient.required_quantity,
                                item.quantity
                            ));
                            insufficient_items.push(InsufficientEntry {
                                inventory_item_id: item_id,
                                ingredient_name: ingredient.ingredient_name.clone(),
                                required: ingredient.required_quantity,
                                available: item.quantity,
                            });
                        }
                    }
                    None => {
                        warnings.push(format!(
                            "Ingredient '{}' of product '{}' references a missing inventory item {}; it will not be tracked",
                            ingredient.ingredient_name, line.product_name, item_id
                        ));
                    }
                }
            }
        }

        if !warnings.is_empty() {
            warn!(
                transaction_id = %request.transaction_id,
                warning_count = warnings.len(),
                "Deduction validation produced warnings"
            );
        }

        let can_proceed = errors.is_empty();
        Ok(DeductionValidation {
            can_proceed,
            errors,
            warnings,
            insufficient_items,
            resolved_lines,
        })
    }

    /// Resolves one line item to its ingredient list.
    async fn resolve_line(
        &self,
        store_id: Uuid,
        line: &LineItem,
    ) -> Result<ResolvedLine, ServiceError> {
        let db = &*self.db;

        let recipe = RecipeEntity::find()
            .filter(recipe::Column::StoreId.eq(store_id))
            .filter(recipe::Column::ProductId.eq(line.product_id))
            .filter(recipe::Column::Active.eq(true))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;

        if let Some(recipe) = recipe {
            let ingredients = RecipeIngredientEntity::find()
                .filter(recipe_ingredient::Column::RecipeId.eq(recipe.id))
                .all(db)
                .await
                .map_err(ServiceError::db_error)?;

            if !ingredients.is_empty() {
                let resolved = ingredients
                    .into_iter()
                    .map(|i| ResolvedIngredient {
                        inventory_item_id: i.inventory_item_id,
                        ingredient_name: i.ingredient_name,
                        unit: i.unit,
                        required_quantity: i.required_quantity * line.quantity,
                    })
                    .collect();
                return Ok(ResolvedLine {
                    product_id: line.product_id,
                    product_name: line.product_name.clone(),
                    source: ResolutionSource::Recipe(recipe.id),
                    ingredients: resolved,
                });
            }
        }

        // No usable recipe: treat the product as an atomic inventory
        // unit and look for a direct name match in the same store.
        let candidates = InventoryItemEntity::find()
            .filter(inventory_item::Column::StoreId.eq(store_id))
            .filter(inventory_item::Column::Active.eq(true))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        if let Some(candidate) = matcher::best_match_with_threshold(
            &line.product_name,
            None,
            &candidates,
            self.direct_match_threshold,
        ) {
            let item = candidate.item;
            return Ok(ResolvedLine {
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                source: ResolutionSource::DirectItem(item.id),
                ingredients: vec![ResolvedIngredient {
                    inventory_item_id: Some(item.id),
                    ingredient_name: item.name,
                    unit: item.unit,
                    required_quantity: line.quantity,
                }],
            });
        }

        Ok(ResolvedLine {
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            source: ResolutionSource::Unresolved,
            ingredients: Vec::new(),
        })
    }
}
