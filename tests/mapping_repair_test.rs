mod common;

use common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use larder_engine::{
    config::AppConfig,
    entities::{
        recipe::{self, Entity as RecipeEntity},
        repair_job::{Entity as RepairJobEntity, RepairStatus},
    },
};

#[tokio::test]
async fn cross_store_reference_is_detected_and_repointed() {
    let test = TestEngine::new().await;
    let store_a = Uuid::new_v4();
    let store_b = Uuid::new_v4();
    let product = Uuid::new_v4();

    // The recipe lives in store A but its ingredient points at store B's
    // stock.
    let wrong_item = seed_item(&test.db, store_b, "Whipped Cream", "serving", dec!(30)).await;
    let right_item = seed_item(&test.db, store_a, "Whipped Cream", "serving", dec!(5)).await;
    let recipe = seed_recipe(
        &test.db,
        store_a,
        product,
        "Hot Chocolate",
        &[("Whipped Cream", dec!(1), "serving", Some(wrong_item.id))],
    )
    .await;

    let report = test.engine.mapping.validate(None).await.expect("validate");
    assert_eq!(report.cross_store.len(), 1);
    assert!(report.missing.is_empty());
    let defect = &report.cross_store[0];
    assert_eq!(defect.recipe_id, recipe.id);
    assert_eq!(defect.recipe_store_id, store_a);
    assert_eq!(defect.item_store_id, store_b);

    // Scoped to an uninvolved store the same data is clean.
    let scoped = test
        .engine
        .mapping
        .validate(Some(store_b))
        .await
        .expect("validate scoped");
    assert!(scoped.is_clean());

    let summary = test.engine.mapping.fix(&report).await.expect("fix");
    assert_eq!(summary.fixed, 1);
    assert_eq!(summary.failed, 0);

    let ingredients = ingredients_for(&test.db, recipe.id).await;
    assert_eq!(ingredients[0].inventory_item_id, Some(right_item.id));

    // Store B's original item is untouched.
    assert_eq!(item_quantity(&test.db, wrong_item.id).await, dec!(30));
}

#[tokio::test]
async fn fix_seeds_zero_quantity_item_when_nothing_matches() {
    let test = TestEngine::new().await;
    let store_a = Uuid::new_v4();
    let store_b = Uuid::new_v4();
    let product = Uuid::new_v4();

    let wrong_item = seed_item(&test.db, store_b, "Matcha Powder", "g", dec!(500)).await;
    let recipe = seed_recipe(
        &test.db,
        store_a,
        product,
        "Matcha Latte",
        &[("Matcha Powder", dec!(5), "g", Some(wrong_item.id))],
    )
    .await;

    let report = test.engine.mapping.validate(Some(store_a)).await.expect("validate");
    assert_eq!(report.cross_store.len(), 1);

    let summary = test.engine.mapping.fix(&report).await.expect("fix");
    assert_eq!(summary.fixed, 1);

    // A fresh zero-quantity item now exists in store A and the
    // ingredient points at it.
    let created = items_in_store(&test.db, store_a).await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, "Matcha Powder");
    assert_eq!(created[0].quantity, Decimal::ZERO);

    let ingredients = ingredients_for(&test.db, recipe.id).await;
    assert_eq!(ingredients[0].inventory_item_id, Some(created[0].id));
}

#[tokio::test]
async fn dangling_reference_is_reported_missing_and_repaired() {
    let test = TestEngine::new().await;
    let store = Uuid::new_v4();
    let product = Uuid::new_v4();

    let replacement = seed_item(&test.db, store, "Oat Milk", "ml", dec!(2000)).await;
    let recipe = seed_recipe(
        &test.db,
        store,
        product,
        "Oat Latte",
        &[("Oat Milk", dec!(200), "ml", Some(Uuid::new_v4()))],
    )
    .await;

    let report = test.engine.mapping.validate(Some(store)).await.expect("validate");
    assert!(report.cross_store.is_empty());
    assert_eq!(report.missing.len(), 1);

    let summary = test.engine.mapping.fix(&report).await.expect("fix");
    assert_eq!(summary.fixed, 1);

    let ingredients = ingredients_for(&test.db, recipe.id).await;
    assert_eq!(ingredients[0].inventory_item_id, Some(replacement.id));
}

#[tokio::test]
async fn repair_instantiates_recipe_from_matching_template() {
    let test = TestEngine::new().await;
    let store = Uuid::new_v4();
    let product = Uuid::new_v4();

    seed_item(&test.db, store, "Whole Milk", "ml", dec!(5000)).await;
    seed_item(&test.db, store, "Espresso Beans", "g", dec!(1000)).await;
    seed_template(
        &test.db,
        "Iced Latte",
        &[
            ("Whole Milk", dec!(200), "ml"),
            ("Espresso Beans", dec!(18), "g"),
        ],
    )
    .await;

    let job = test
        .engine
        .repair
        .enqueue_for_product(store, product, "Iced Latte", "no recipe for sold product")
        .await
        .expect("enqueue");

    let summary = test.engine.repair.process_pending(10).await.expect("process");
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.succeeded, 1);

    let created = RecipeEntity::find()
        .filter(recipe::Column::StoreId.eq(store))
        .filter(recipe::Column::ProductId.eq(product))
        .one(&*test.db)
        .await
        .expect("query recipe")
        .expect("recipe created");
    assert!(created.active);
    assert!(!created.needs_review);

    let ingredients = ingredients_for(&test.db, created.id).await;
    assert_eq!(ingredients.len(), 2);
    for ingredient in &ingredients {
        assert!(ingredient.inventory_item_id.is_some());
    }

    let job = RepairJobEntity::find_by_id(job.id)
        .one(&*test.db)
        .await
        .expect("query job")
        .expect("job exists");
    assert_eq!(job.status, RepairStatus::Success.as_str());
}

#[tokio::test]
async fn repair_synthesizes_review_shell_without_template() {
    let test = TestEngine::new().await;
    let store = Uuid::new_v4();
    let product = Uuid::new_v4();

    test.engine
        .repair
        .enqueue_for_product(store, product, "Seasonal Special", "no recipe for sold product")
        .await
        .expect("enqueue");

    let summary = test.engine.repair.process_pending(10).await.expect("process");
    assert_eq!(summary.succeeded, 1);

    let created = RecipeEntity::find()
        .filter(recipe::Column::ProductId.eq(product))
        .one(&*test.db)
        .await
        .expect("query recipe")
        .expect("shell created");
    assert!(created.needs_review);
    assert!(ingredients_for(&test.db, created.id).await.is_empty());
}

#[tokio::test]
async fn repair_job_reaches_terminal_failed_after_max_attempts() {
    let mut cfg = AppConfig::new("sqlite::memory:", "test");
    cfg.engine.max_repair_attempts = 2;
    let test = TestEngine::with_config(cfg).await;
    let store = Uuid::new_v4();
    let product = Uuid::new_v4();

    // The stored request can never replay: the recipe demands more than
    // the store holds.
    let syrup = seed_item(&test.db, store, "Caramel Syrup", "ml", dec!(50)).await;
    seed_recipe(
        &test.db,
        store,
        product,
        "Caramel Latte",
        &[("Caramel Syrup", dec!(100), "ml", Some(syrup.id))],
    )
    .await;

    let req = request(store, &[(product, "Caramel Latte", dec!(1))]);
    let job = test
        .engine
        .repair
        .enqueue_for_transaction(&req, "deduction failed")
        .await
        .expect("enqueue");

    // First pass fails and re-queues.
    let summary = test.engine.repair.process_pending(10).await.expect("pass 1");
    assert_eq!(summary.retried, 1);
    let reloaded = RepairJobEntity::find_by_id(job.id)
        .one(&*test.db)
        .await
        .expect("query job")
        .expect("job exists");
    assert_eq!(reloaded.status, RepairStatus::Pending.as_str());
    assert_eq!(reloaded.attempts, 1);

    // Second pass exhausts the budget.
    let summary = test.engine.repair.process_pending(10).await.expect("pass 2");
    assert_eq!(summary.exhausted, 1);
    let reloaded = RepairJobEntity::find_by_id(job.id)
        .one(&*test.db)
        .await
        .expect("query job")
        .expect("job exists");
    assert_eq!(reloaded.status, RepairStatus::Failed.as_str());
    assert_eq!(reloaded.attempts, 2);
    assert!(reloaded.last_error.is_some());

    // Terminal failure never touched the stock.
    assert_eq!(item_quantity(&test.db, syrup.id).await, dec!(50));
}

#[tokio::test]
async fn requeued_transaction_replays_after_restock() {
    let test = TestEngine::new().await;
    let store = Uuid::new_v4();
    let product = Uuid::new_v4();

    let syrup = seed_item(&test.db, store, "Caramel Syrup", "ml", dec!(50)).await;
    seed_recipe(
        &test.db,
        store,
        product,
        "Caramel Latte",
        &[("Caramel Syrup", dec!(100), "ml", Some(syrup.id))],
    )
    .await;

    let req = request(store, &[(product, "Caramel Latte", dec!(1))]);
    test.engine
        .repair
        .enqueue_for_transaction(&req, "deduction failed")
        .await
        .expect("enqueue");

    let summary = test.engine.repair.process_pending(10).await.expect("pass 1");
    assert_eq!(summary.retried, 1);

    // Restock arrives; the next pass replays the sale.
    set_item_quantity(&test.db, syrup.id, dec!(500)).await;
    let summary = test.engine.repair.process_pending(10).await.expect("pass 2");
    assert_eq!(summary.succeeded, 1);

    assert_eq!(item_quantity(&test.db, syrup.id).await, dec!(400));
    let movements = movements_for(&test.db, req.transaction_id).await;
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].delta_quantity, dec!(-100));
}
