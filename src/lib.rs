//! Larder Engine
//!
//! Inventory deduction and reconciliation core for a multi-store food
//! retail platform. A checkout workflow hands the engine one
//! `DeductionRequest` per completed sale; the engine resolves each sold
//! product to the raw materials it consumes, deducts them from the
//! store's stock under per-item serialization, appends an auditable
//! movement ledger, and repairs the mapping/recipe gaps it discovers
//! along the way. An operations dashboard reads the per-store sync
//! health view this crate derives.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{
    deduction_executor::{DeductionExecutorService, DeductionOutcome},
    deduction_validator::{DeductionRequest, DeductionValidation, DeductionValidationService},
    mapping::MappingValidationService,
    repair::RepairService,
    sync_health::{HealthThresholds, SyncHealthService},
};

/// Fully wired engine: every service sharing one connection pool and
/// event channel, configured from one `AppConfig`.
#[derive(Clone)]
pub struct Engine {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub validator: DeductionValidationService,
    pub executor: DeductionExecutorService,
    pub mapping: MappingValidationService,
    pub repair: Arc<RepairService>,
    pub health: Arc<SyncHealthService>,
}

impl Engine {
    /// Wires the service graph over an established connection.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: AppConfig,
        event_sender: Option<EventSender>,
    ) -> Self {
        let engine_cfg = &config.engine;

        let validator = DeductionValidationService::new(db.clone())
            .with_direct_match_threshold(engine_cfg.match_accept_bulk);
        let executor = DeductionExecutorService::new(
            db.clone(),
            validator.clone(),
            event_sender.clone(),
            engine_cfg.shortfall_policy,
        );
        let mapping = MappingValidationService::new(db.clone(), event_sender.clone())
            .with_bulk_threshold(engine_cfg.match_accept_bulk);
        let repair = Arc::new(
            RepairService::new(
                db.clone(),
                validator.clone(),
                executor.clone(),
                mapping.clone(),
                event_sender.clone(),
                engine_cfg.max_repair_attempts,
            )
            .with_thresholds(
                engine_cfg.match_accept_bulk,
                engine_cfg.match_accept_interactive,
            ),
        );
        let health = Arc::new(SyncHealthService::new(
            db.clone(),
            event_sender,
            HealthThresholds {
                missing_mapping_warning: engine_cfg.missing_mapping_warning_threshold,
                failed_deduction_critical: engine_cfg.failed_deduction_critical_threshold,
            },
        ));

        Self {
            db,
            config,
            validator,
            executor,
            mapping,
            repair,
            health,
        }
    }

    /// Connects, optionally migrates, and wires the engine from config.
    pub async fn from_config(
        config: AppConfig,
        event_sender: Option<EventSender>,
    ) -> Result<Self, ServiceError> {
        let db = Arc::new(db::establish_connection_from_app_config(&config).await?);
        if config.auto_migrate {
            db::run_migrations(&db).await?;
        }
        Ok(Self::new(db, config, event_sender))
    }

    /// Validates a sale's inventory effects without mutating anything.
    pub async fn validate_sale(
        &self,
        request: &DeductionRequest,
    ) -> Result<DeductionValidation, ServiceError> {
        self.validator.resolve_and_validate(request).await
    }

    /// Processes a completed sale end to end: validate, execute with the
    /// configured timeout, and enqueue a repair job on repairable
    /// failure.
    pub async fn process_sale(
        &self,
        request: &DeductionRequest,
    ) -> Result<DeductionOutcome, ServiceError> {
        let timeout = Duration::from_secs(self.config.engine.deduction_timeout_secs);
        self.repair.execute_or_enqueue(request, timeout).await
    }
}
