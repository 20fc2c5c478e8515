#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use tokio::task::JoinHandle;
use uuid::Uuid;

use larder_engine::{
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        inventory_item,
        inventory_movement::{self, Entity as InventoryMovementEntity},
        recipe, recipe_ingredient, recipe_template,
        sync_outcome::{self, Entity as SyncOutcomeEntity},
    },
    events,
    services::deduction_validator::{DeductionRequest, LineItem},
    Engine,
};

/// Test harness wiring the engine over an in-memory SQLite database.
///
/// The pool is pinned to a single connection: every new `sqlite::memory:`
/// connection would otherwise see its own empty database.
pub struct TestEngine {
    pub engine: Engine,
    pub db: Arc<sea_orm::DatabaseConnection>,
    _event_task: JoinHandle<()>,
}

impl TestEngine {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::new("sqlite::memory:", "test")).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let db_cfg = DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&db_cfg)
            .await
            .expect("db connect");
        db::run_migrations(&pool).await.expect("migrations");
        let db = Arc::new(pool);

        let (sender, rx) = events::channel(64);
        let event_task = tokio::spawn(events::process_events(rx));

        let engine = Engine::new(db.clone(), cfg, Some(sender));
        Self {
            engine,
            db,
            _event_task: event_task,
        }
    }
}

pub async fn seed_item(
    db: &sea_orm::DatabaseConnection,
    store_id: Uuid,
    name: &str,
    unit: &str,
    quantity: Decimal,
) -> inventory_item::Model {
    seed_item_with_threshold(db, store_id, name, unit, quantity, Decimal::ZERO).await
}

pub async fn seed_item_with_threshold(
    db: &sea_orm::DatabaseConnection,
    store_id: Uuid,
    name: &str,
    unit: &str,
    quantity: Decimal,
    minimum_threshold: Decimal,
) -> inventory_item::Model {
    let now = Utc::now();
    inventory_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        store_id: Set(store_id),
        name: Set(name.to_string()),
        unit: Set(unit.to_string()),
        quantity: Set(quantity),
        minimum_threshold: Set(minimum_threshold),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed inventory item")
}

/// Seeds an active recipe with the given ingredient rows:
/// (name, per-unit quantity, unit, mapped inventory item).
pub async fn seed_recipe(
    db: &sea_orm::DatabaseConnection,
    store_id: Uuid,
    product_id: Uuid,
    name: &str,
    ingredients: &[(&str, Decimal, &str, Option<Uuid>)],
) -> recipe::Model {
    let now = Utc::now();
    let created = recipe::ActiveModel {
        id: Set(Uuid::new_v4()),
        store_id: Set(store_id),
        product_id: Set(product_id),
        name: Set(name.to_string()),
        active: Set(true),
        needs_review: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed recipe");

    for (ingredient_name, quantity, unit, item_id) in ingredients {
        recipe_ingredient::ActiveModel {
            id: Set(Uuid::new_v4()),
            recipe_id: Set(created.id),
            ingredient_name: Set(ingredient_name.to_string()),
            required_quantity: Set(*quantity),
            unit: Set(unit.to_string()),
            inventory_item_id: Set(*item_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .expect("seed recipe ingredient");
    }

    created
}

pub async fn seed_template(
    db: &sea_orm::DatabaseConnection,
    name: &str,
    lines: &[(&str, Decimal, &str)],
) -> recipe_template::Model {
    let now = Utc::now();
    let ingredients: Vec<serde_json::Value> = lines
        .iter()
        .map(|(n, q, u)| {
            serde_json::json!({
                "name": n,
                "quantity": q,
                "unit": u,
            })
        })
        .collect();
    recipe_template::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        ingredients: Set(serde_json::Value::Array(ingredients)),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed recipe template")
}

pub fn request(store_id: Uuid, lines: &[(Uuid, &str, Decimal)]) -> DeductionRequest {
    DeductionRequest {
        transaction_id: Uuid::new_v4(),
        store_id,
        line_items: lines
            .iter()
            .map(|(product_id, name, quantity)| LineItem {
                product_id: *product_id,
                product_name: name.to_string(),
                quantity: *quantity,
            })
            .collect(),
    }
}

pub async fn movements_for(
    db: &sea_orm::DatabaseConnection,
    transaction_id: Uuid,
) -> Vec<inventory_movement::Model> {
    InventoryMovementEntity::find()
        .filter(inventory_movement::Column::ReferenceId.eq(transaction_id))
        .all(db)
        .await
        .expect("fetch movements")
}

pub async fn item_quantity(db: &sea_orm::DatabaseConnection, item_id: Uuid) -> Decimal {
    inventory_item::Entity::find_by_id(item_id)
        .one(db)
        .await
        .expect("fetch item")
        .expect("item exists")
        .quantity
}

pub async fn set_item_quantity(
    db: &sea_orm::DatabaseConnection,
    item_id: Uuid,
    quantity: Decimal,
) {
    let item = inventory_item::Entity::find_by_id(item_id)
        .one(db)
        .await
        .expect("fetch item")
        .expect("item exists");
    let mut active: inventory_item::ActiveModel = item.into();
    active.quantity = Set(quantity);
    active.updated_at = Set(Utc::now());
    active.update(db).await.expect("update item quantity");
}

pub async fn ingredients_for(
    db: &sea_orm::DatabaseConnection,
    recipe_id: Uuid,
) -> Vec<recipe_ingredient::Model> {
    recipe_ingredient::Entity::find()
        .filter(recipe_ingredient::Column::RecipeId.eq(recipe_id))
        .all(db)
        .await
        .expect("fetch recipe ingredients")
}

pub async fn items_in_store(
    db: &sea_orm::DatabaseConnection,
    store_id: Uuid,
) -> Vec<inventory_item::Model> {
    inventory_item::Entity::find()
        .filter(inventory_item::Column::StoreId.eq(store_id))
        .all(db)
        .await
        .expect("fetch store items")
}

pub async fn outcomes_for_store(
    db: &sea_orm::DatabaseConnection,
    store_id: Uuid,
) -> Vec<sync_outcome::Model> {
    SyncOutcomeEntity::find()
        .filter(sync_outcome::Column::StoreId.eq(store_id))
        .all(db)
        .await
        .expect("fetch outcomes")
}
