use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_inventory_items_table::Migration),
            Box::new(m20240301_000002_create_recipes_table::Migration),
            Box::new(m20240301_000003_create_recipe_ingredients_table::Migration),
            Box::new(m20240301_000004_create_recipe_templates_table::Migration),
            Box::new(m20240301_000005_create_inventory_movements_table::Migration),
            Box::new(m20240301_000006_create_sync_outcomes_table::Migration),
            Box::new(m20240301_000007_create_repair_jobs_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_inventory_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_inventory_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryItems::StoreId).uuid().not_null())
                        .col(ColumnDef::new(InventoryItems::Name).string().not_null())
                        .col(ColumnDef::new(InventoryItems::Unit).string().not_null())
                        .col(
                            ColumnDef::new(InventoryItems::Quantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::MinimumThreshold)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_inventory_items_store")
                        .table(InventoryItems::Table)
                        .col(InventoryItems::StoreId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryItems {
        Table,
        Id,
        StoreId,
        Name,
        Unit,
        Quantity,
        MinimumThreshold,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_recipes_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_recipes_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Recipes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Recipes::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Recipes::StoreId).uuid().not_null())
                        .col(ColumnDef::new(Recipes::ProductId).uuid().not_null())
                        .col(ColumnDef::new(Recipes::Name).string().not_null())
                        .col(
                            ColumnDef::new(Recipes::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Recipes::NeedsReview)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Recipes::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Recipes::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_recipes_store_product")
                        .table(Recipes::Table)
                        .col(Recipes::StoreId)
                        .col(Recipes::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Recipes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Recipes {
        Table,
        Id,
        StoreId,
        ProductId,
        Name,
        Active,
        NeedsReview,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_recipe_ingredients_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_recipe_ingredients_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RecipeIngredients::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RecipeIngredients::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecipeIngredients::RecipeId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecipeIngredients::IngredientName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecipeIngredients::RequiredQuantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RecipeIngredients::Unit).string().not_null())
                        .col(
                            ColumnDef::new(RecipeIngredients::InventoryItemId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(RecipeIngredients::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecipeIngredients::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_recipe_ingredients_recipe")
                        .table(RecipeIngredients::Table)
                        .col(RecipeIngredients::RecipeId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RecipeIngredients::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum RecipeIngredients {
        Table,
        Id,
        RecipeId,
        IngredientName,
        RequiredQuantity,
        Unit,
        InventoryItemId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_recipe_templates_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_recipe_templates_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RecipeTemplates::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RecipeTemplates::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RecipeTemplates::Name).string().not_null())
                        .col(
                            ColumnDef::new(RecipeTemplates::Ingredients)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecipeTemplates::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(RecipeTemplates::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecipeTemplates::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RecipeTemplates::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum RecipeTemplates {
        Table,
        Id,
        Name,
        Ingredients,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000005_create_inventory_movements_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_inventory_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::InventoryItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::ReferenceId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::DeltaQuantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::PreviousQuantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::NewQuantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryMovements::Note).string().null())
                        .col(
                            ColumnDef::new(InventoryMovements::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_inventory_movements_item")
                        .table(InventoryMovements::Table)
                        .col(InventoryMovements::InventoryItemId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_inventory_movements_reference")
                        .table(InventoryMovements::Table)
                        .col(InventoryMovements::ReferenceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryMovements {
        Table,
        Id,
        InventoryItemId,
        ReferenceId,
        DeltaQuantity,
        PreviousQuantity,
        NewQuantity,
        Note,
        CreatedAt,
    }
}

mod m20240301_000006_create_sync_outcomes_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_sync_outcomes_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SyncOutcomes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SyncOutcomes::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SyncOutcomes::TransactionId).uuid().not_null())
                        .col(ColumnDef::new(SyncOutcomes::StoreId).uuid().not_null())
                        .col(ColumnDef::new(SyncOutcomes::Status).string().not_null())
                        .col(
                            ColumnDef::new(SyncOutcomes::ItemsProcessed)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(SyncOutcomes::ErrorDetails).string().null())
                        .col(
                            ColumnDef::new(SyncOutcomes::DurationMs)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(SyncOutcomes::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_sync_outcomes_store_created")
                        .table(SyncOutcomes::Table)
                        .col(SyncOutcomes::StoreId)
                        .col(SyncOutcomes::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SyncOutcomes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum SyncOutcomes {
        Table,
        Id,
        TransactionId,
        StoreId,
        Status,
        ItemsProcessed,
        ErrorDetails,
        DurationMs,
        CreatedAt,
    }
}

mod m20240301_000007_create_repair_jobs_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000007_create_repair_jobs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RepairJobs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(RepairJobs::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(RepairJobs::TransactionId).uuid().null())
                        .col(ColumnDef::new(RepairJobs::ProductId).uuid().null())
                        .col(ColumnDef::new(RepairJobs::ProductName).string().null())
                        .col(ColumnDef::new(RepairJobs::StoreId).uuid().not_null())
                        .col(ColumnDef::new(RepairJobs::Request).json().null())
                        .col(
                            ColumnDef::new(RepairJobs::Attempts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(RepairJobs::MaxAttempts).integer().not_null())
                        .col(ColumnDef::new(RepairJobs::Status).string().not_null())
                        .col(ColumnDef::new(RepairJobs::LastError).string().null())
                        .col(ColumnDef::new(RepairJobs::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(RepairJobs::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_repair_jobs_status")
                        .table(RepairJobs::Table)
                        .col(RepairJobs::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RepairJobs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum RepairJobs {
        Table,
        Id,
        TransactionId,
        ProductId,
        ProductName,
        StoreId,
        Request,
        Attempts,
        MaxAttempts,
        Status,
        LastError,
        CreatedAt,
        UpdatedAt,
    }
}
