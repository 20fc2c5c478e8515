use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reusable recipe blueprint the repair orchestrator instantiates when a
/// sold product has no recipe of its own. Ingredient lines are stored as
/// a JSON document rather than child rows since templates are read-only
/// source material.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "recipe_templates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub ingredients: Json,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One ingredient line inside a template's JSON document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateIngredient {
    pub name: String,
    pub quantity: Decimal,
    pub unit: String,
}

impl Model {
    /// Decodes the JSON ingredient document.
    pub fn ingredient_lines(&self) -> Result<Vec<TemplateIngredient>, serde_json::Error> {
        serde_json::from_value(self.ingredients.clone())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
