mod common;

use common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use larder_engine::{
    config::{AppConfig, ShortfallPolicy},
    entities::sync_outcome::SyncStatus,
    errors::ServiceError,
};

#[tokio::test]
async fn recipe_sale_deducts_and_writes_one_movement() {
    let test = TestEngine::new().await;
    let store = Uuid::new_v4();
    let product = Uuid::new_v4();

    let cream = seed_item(&test.db, store, "Whipped Cream", "serving", dec!(10)).await;
    seed_recipe(
        &test.db,
        store,
        product,
        "Hot Chocolate",
        &[("Whipped Cream", dec!(1), "serving", Some(cream.id))],
    )
    .await;

    let req = request(store, &[(product, "Hot Chocolate", dec!(1))]);
    let outcome = test.engine.process_sale(&req).await.expect("sale succeeds");

    assert!(outcome.success);
    assert_eq!(outcome.movements_created, 1);
    assert_eq!(item_quantity(&test.db, cream.id).await, dec!(9));

    let movements = movements_for(&test.db, req.transaction_id).await;
    assert_eq!(movements.len(), 1);
    let movement = &movements[0];
    assert_eq!(movement.delta_quantity, dec!(-1));
    assert_eq!(movement.previous_quantity, dec!(10));
    assert_eq!(movement.new_quantity, dec!(9));
    assert_eq!(movement.inventory_item_id, cream.id);

    let outcomes = outcomes_for_store(&test.db, store).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, SyncStatus::Success.as_str());
    assert_eq!(outcomes[0].transaction_id, req.transaction_id);
}

#[tokio::test]
async fn exact_stock_boundary_leaves_zero() {
    let test = TestEngine::new().await;
    let store = Uuid::new_v4();
    let product = Uuid::new_v4();

    let beans = seed_item(&test.db, store, "Espresso Beans", "g", dec!(36)).await;
    seed_recipe(
        &test.db,
        store,
        product,
        "Double Espresso",
        &[("Espresso Beans", dec!(18), "g", Some(beans.id))],
    )
    .await;

    let req = request(store, &[(product, "Double Espresso", dec!(2))]);
    let outcome = test.engine.process_sale(&req).await.expect("sale succeeds");

    assert!(outcome.success);
    assert_eq!(item_quantity(&test.db, beans.id).await, Decimal::ZERO);
}

#[tokio::test]
async fn insufficient_stock_is_rejected_before_execution() {
    let test = TestEngine::new().await;
    let store = Uuid::new_v4();
    let product = Uuid::new_v4();

    let milk = seed_item(&test.db, store, "Whole Milk", "ml", dec!(200)).await;
    seed_recipe(
        &test.db,
        store,
        product,
        "Latte",
        &[("Whole Milk", dec!(250), "ml", Some(milk.id))],
    )
    .await;

    let req = request(store, &[(product, "Latte", dec!(1))]);

    let validation = test
        .engine
        .validate_sale(&req)
        .await
        .expect("validation runs");
    assert!(!validation.can_proceed);
    assert_eq!(validation.insufficient_items.len(), 1);
    let entry = &validation.insufficient_items[0];
    assert_eq!(entry.inventory_item_id, milk.id);
    assert_eq!(entry.required, dec!(250));
    assert_eq!(entry.available, dec!(200));

    let result = test.engine.process_sale(&req).await;
    assert!(matches!(result, Err(ServiceError::InsufficientStock(_))));

    // Stock untouched, ledger untouched.
    assert_eq!(item_quantity(&test.db, milk.id).await, dec!(200));
    assert!(movements_for(&test.db, req.transaction_id).await.is_empty());
}

#[tokio::test]
async fn unmapped_ingredient_warns_but_sale_proceeds() {
    let test = TestEngine::new().await;
    let store = Uuid::new_v4();
    let product = Uuid::new_v4();

    let base = seed_item(&test.db, store, "Croissant Dough", "pieces", dec!(20)).await;
    seed_recipe(
        &test.db,
        store,
        product,
        "Croissant",
        &[
            ("Croissant Dough", dec!(1), "pieces", Some(base.id)),
            // Free-text garnish nobody tracks as inventory.
            ("Powdered Sugar Dusting", dec!(1), "serving", None),
        ],
    )
    .await;

    let req = request(store, &[(product, "Croissant", dec!(2))]);
    let outcome = test.engine.process_sale(&req).await.expect("sale succeeds");

    assert!(outcome.success);
    assert_eq!(outcome.movements_created, 1);
    assert!(!outcome.warnings.is_empty());
    assert_eq!(item_quantity(&test.db, base.id).await, dec!(18));

    let outcomes = outcomes_for_store(&test.db, store).await;
    assert_eq!(outcomes[0].status, SyncStatus::Partial.as_str());
}

#[tokio::test]
async fn unresolved_line_is_skipped_and_rest_succeeds() {
    let test = TestEngine::new().await;
    let store = Uuid::new_v4();
    let mapped_product = Uuid::new_v4();
    let ghost_product = Uuid::new_v4();

    let juice = seed_item(&test.db, store, "Orange Juice", "ml", dec!(1000)).await;
    seed_recipe(
        &test.db,
        store,
        mapped_product,
        "Fresh Juice",
        &[("Orange Juice", dec!(250), "ml", Some(juice.id))],
    )
    .await;

    // The ghost product has no recipe and nothing resembling it in
    // inventory.
    let req = request(
        store,
        &[
            (mapped_product, "Fresh Juice", dec!(1)),
            (ghost_product, "Birthday Candle Bundle", dec!(1)),
        ],
    );
    let outcome = test.engine.process_sale(&req).await.expect("sale succeeds");

    assert!(outcome.success);
    assert_eq!(outcome.movements_created, 1);
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.contains("Birthday Candle Bundle")));
    assert_eq!(item_quantity(&test.db, juice.id).await, dec!(750));
}

#[tokio::test]
async fn product_without_recipe_falls_back_to_direct_item_match() {
    let test = TestEngine::new().await;
    let store = Uuid::new_v4();
    let product = Uuid::new_v4();

    // No recipe: the bottled water itself is the inventory unit.
    let water = seed_item(&test.db, store, "Bottled Water", "pieces", dec!(48)).await;

    let req = request(store, &[(product, "Bottled Water", dec!(3))]);
    let outcome = test.engine.process_sale(&req).await.expect("sale succeeds");

    assert!(outcome.success);
    assert_eq!(outcome.movements_created, 1);
    assert_eq!(item_quantity(&test.db, water.id).await, dec!(45));

    let movements = movements_for(&test.db, req.transaction_id).await;
    assert_eq!(movements[0].delta_quantity, dec!(-3));
}

#[tokio::test]
async fn ledger_is_complete_for_multi_ingredient_recipes() {
    let test = TestEngine::new().await;
    let store = Uuid::new_v4();
    let product = Uuid::new_v4();

    let flour = seed_item(&test.db, store, "Bread Flour", "g", dec!(5000)).await;
    let butter = seed_item(&test.db, store, "Butter", "g", dec!(2000)).await;
    seed_recipe(
        &test.db,
        store,
        product,
        "Butter Croissant",
        &[
            ("Bread Flour", dec!(55), "g", Some(flour.id)),
            ("Butter", dec!(30), "g", Some(butter.id)),
        ],
    )
    .await;

    let req = request(store, &[(product, "Butter Croissant", dec!(4))]);
    let outcome = test.engine.process_sale(&req).await.expect("sale succeeds");

    assert_eq!(outcome.movements_created, 2);

    let movements = movements_for(&test.db, req.transaction_id).await;
    assert_eq!(movements.len(), 2);
    for movement in &movements {
        assert!(movement.delta_quantity < Decimal::ZERO);
        assert_eq!(
            movement.previous_quantity + movement.delta_quantity,
            movement.new_quantity
        );
    }
    assert_eq!(item_quantity(&test.db, flour.id).await, dec!(4780));
    assert_eq!(item_quantity(&test.db, butter.id).await, dec!(1880));
}

#[tokio::test]
async fn clamp_policy_floors_at_zero_when_stock_moved_after_validation() {
    let test = TestEngine::new().await;
    let store = Uuid::new_v4();
    let product = Uuid::new_v4();

    let syrup = seed_item(&test.db, store, "Vanilla Syrup", "ml", dec!(100)).await;
    seed_recipe(
        &test.db,
        store,
        product,
        "Vanilla Shake",
        &[("Vanilla Syrup", dec!(150), "ml", Some(syrup.id))],
    )
    .await;

    // Bypass the validation gate to model stock moving between a
    // passing validation and the write; the executor re-checks under
    // the lock and applies the clamp policy.
    let req = request(store, &[(product, "Vanilla Shake", dec!(1))]);
    let outcome = test
        .engine
        .executor
        .execute(&req)
        .await
        .expect("clamped execution succeeds");

    assert!(outcome.success);
    assert_eq!(outcome.movements_created, 1);
    assert!(outcome.warnings.iter().any(|w| w.contains("clamped")));
    assert_eq!(item_quantity(&test.db, syrup.id).await, Decimal::ZERO);

    let movements = movements_for(&test.db, req.transaction_id).await;
    // The ledger records the delta actually applied, not the request.
    assert_eq!(movements[0].delta_quantity, dec!(-100));
    assert_eq!(movements[0].new_quantity, Decimal::ZERO);
}

#[tokio::test]
async fn reject_policy_fails_the_request_instead_of_clamping() {
    let mut cfg = AppConfig::new("sqlite::memory:", "test");
    cfg.engine.shortfall_policy = ShortfallPolicy::Reject;
    let test = TestEngine::with_config(cfg).await;
    let store = Uuid::new_v4();
    let product = Uuid::new_v4();

    let syrup = seed_item(&test.db, store, "Vanilla Syrup", "ml", dec!(100)).await;
    seed_recipe(
        &test.db,
        store,
        product,
        "Vanilla Shake",
        &[("Vanilla Syrup", dec!(150), "ml", Some(syrup.id))],
    )
    .await;

    let req = request(store, &[(product, "Vanilla Shake", dec!(1))]);
    let result = test.engine.executor.execute(&req).await;
    assert!(matches!(result, Err(ServiceError::ExecutionFailure(_))));

    // Nothing applied, nothing in the ledger.
    assert_eq!(item_quantity(&test.db, syrup.id).await, dec!(100));
    assert!(movements_for(&test.db, req.transaction_id).await.is_empty());

    let outcomes = outcomes_for_store(&test.db, store).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, SyncStatus::CriticalFailure.as_str());
}

#[tokio::test]
async fn empty_request_is_invalid_input() {
    let test = TestEngine::new().await;
    let store = Uuid::new_v4();

    let req = request(store, &[]);
    let result = test.engine.process_sale(&req).await;
    assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
}
