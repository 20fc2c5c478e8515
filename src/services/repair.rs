//! Repair and retry orchestration.
//!
//! Failed deductions become durable `RepairJob` rows and move through a
//! bounded state machine (pending, processing, success or failed) rather
//! than an in-memory retry loop, so a process restart loses nothing.
//! Remediation synthesizes missing recipes from templates, delegates
//! mapping defects to the mapping validator, and then re-runs the
//! validator/executor pair for the stored request. Exhausting the
//! attempt budget parks the job at `failed` for manual operator action;
//! no job disappears without a terminal record.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        inventory_item::{self, Entity as InventoryItemEntity},
        recipe::{self, Entity as RecipeEntity},
        recipe_ingredient,
        recipe_template::{self, Entity as RecipeTemplateEntity},
        repair_job::{self, Entity as RepairJobEntity, RepairStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::deduction_executor::{DeductionExecutorService, DeductionOutcome},
    services::deduction_validator::{DeductionRequest, DeductionValidationService},
    services::mapping::MappingValidationService,
    services::matcher::{self, MatchPolicy},
    services::normalize::normalize_name,
};

/// Tally of one `process_pending` pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepairRunSummary {
    pub processed: u32,
    pub succeeded: u32,
    pub retried: u32,
    pub exhausted: u32,
}

/// Orchestrator for remediation of failed deductions and missing
/// product data.
#[derive(Clone)]
pub struct RepairService {
    db: Arc<DatabaseConnection>,
    validator: DeductionValidationService,
    executor: DeductionExecutorService,
    mapping: MappingValidationService,
    event_sender: Option<EventSender>,
    max_attempts: i32,
    template_threshold: f64,
    suggestion_threshold: f64,
}

impl RepairService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        validator: DeductionValidationService,
        executor: DeductionExecutorService,
        mapping: MappingValidationService,
        event_sender: Option<EventSender>,
        max_attempts: i32,
    ) -> Self {
        Self {
            db,
            validator,
            executor,
            mapping,
            event_sender,
            max_attempts,
            template_threshold: MatchPolicy::Bulk.default_threshold(),
            suggestion_threshold: MatchPolicy::Interactive.default_threshold(),
        }
    }

    pub fn with_thresholds(mut self, template: f64, suggestion: f64) -> Self {
        self.template_threshold = template;
        self.suggestion_threshold = suggestion;
        self
    }

    /// Checkout-facing entry point: validate, execute with a timeout,
    /// and turn any repairable failure into a durable repair job before
    /// propagating it.
    #[instrument(skip(self, request), fields(transaction_id = %request.transaction_id))]
    pub async fn execute_or_enqueue(
        &self,
        request: &DeductionRequest,
        timeout: Duration,
    ) -> Result<DeductionOutcome, ServiceError> {
        let validation = self.validator.resolve_and_validate(request).await?;
        if !validation.can_proceed {
            let details = validation.errors.join("; ");
            if let Err(e) = self.executor.record_rejection(request, &details).await {
                error!(
                    transaction_id = %request.transaction_id,
                    error = %e,
                    "Failed to record rejected deduction outcome"
                );
            }
            return Err(ServiceError::InsufficientStock(details));
        }

        match self.executor.execute_with_timeout(request, timeout).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_repairable() => {
                if let Err(enqueue_err) = self
                    .enqueue_for_transaction(request, &e.to_string())
                    .await
                {
                    error!(
                        transaction_id = %request.transaction_id,
                        error = %enqueue_err,
                        "Failed to enqueue repair job after deduction failure"
                    );
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Creates a pending job carrying the full request so the retry
    /// survives process restarts.
    pub async fn enqueue_for_transaction(
        &self,
        request: &DeductionRequest,
        reason: &str,
    ) -> Result<repair_job::Model, ServiceError> {
        let payload = serde_json::to_value(request)?;
        self.insert_job(
            Some(request.transaction_id),
            None,
            None,
            request.store_id,
            Some(payload),
            reason,
        )
        .await
    }

    /// Creates a pending job for one product's data defects (no
    /// transaction to replay).
    pub async fn enqueue_for_product(
        &self,
        store_id: Uuid,
        product_id: Uuid,
        product_name: &str,
        reason: &str,
    ) -> Result<repair_job::Model, ServiceError> {
        self.insert_job(
            None,
            Some(product_id),
            Some(product_name.to_string()),
            store_id,
            None,
            reason,
        )
        .await
    }

    async fn insert_job(
        &self,
        transaction_id: Option<Uuid>,
        product_id: Option<Uuid>,
        product_name: Option<String>,
        store_id: Uuid,
        request: Option<serde_json::Value>,
        reason: &str,
    ) -> Result<repair_job::Model, ServiceError> {
        let now = Utc::now();
        let job = repair_job::ActiveModel {
            id: Set(Uuid::new_v4()),
            transaction_id: Set(transaction_id),
            product_id: Set(product_id),
            product_name: Set(product_name),
            store_id: Set(store_id),
            request: Set(request),
            attempts: Set(0),
            max_attempts: Set(self.max_attempts),
            status: Set(RepairStatus::Pending.as_str().to_string()),
            last_error: Set(Some(reason.to_string())),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = job.insert(&*self.db).await.map_err(|e| {
            error!("Failed to create repair job: {}", e);
            ServiceError::db_error(e)
        })?;

        info!(
            job_id = %created.id,
            store_id = %store_id,
            reason = %reason,
            "Repair job queued"
        );
        counter!("larder_repair_jobs_queued_total", 1);

        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::RepairJobQueued {
                    job_id: created.id,
                    store_id,
                })
                .await;
        }

        Ok(created)
    }

    /// Works through pending jobs oldest-first, driving each through one
    /// attempt of the state machine.
    #[instrument(skip(self))]
    pub async fn process_pending(&self, limit: u64) -> Result<RepairRunSummary, ServiceError> {
        let jobs = RepairJobEntity::find()
            .filter(repair_job::Column::Status.eq(RepairStatus::Pending.as_str()))
            .order_by_asc(repair_job::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut summary = RepairRunSummary::default();

        for job in jobs {
            summary.processed += 1;

            let attempts = job.attempts + 1;
            let mut active: repair_job::ActiveModel = job.clone().into();
            active.status = Set(RepairStatus::Processing.as_str().to_string());
            active.attempts = Set(attempts);
            active.updated_at = Set(Utc::now());
            let job = active.update(&*self.db).await.map_err(ServiceError::db_error)?;

            match self.attempt(&job).await {
                Ok(()) => {
                    self.finish_job(&job, RepairStatus::Success, None).await?;
                    summary.succeeded += 1;
                    counter!("larder_repair_jobs_total", 1, "result" => "success");
                    if let Some(sender) = &self.event_sender {
                        let _ = sender.send(Event::RepairJobSucceeded { job_id: job.id }).await;
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    if attempts >= job.max_attempts {
                        self.finish_job(&job, RepairStatus::Failed, Some(message.clone()))
                            .await?;
                        summary.exhausted += 1;
                        counter!("larder_repair_jobs_total", 1, "result" => "exhausted");
                        error!(
                            job_id = %job.id,
                            attempts = attempts,
                            error = %message,
                            "Repair job failed terminally"
                        );
                        if let Some(sender) = &self.event_sender {
                            let _ = sender
                                .send(Event::RepairJobFailed {
                                    job_id: job.id,
                                    attempts,
                                    last_error: message,
                                })
                                .await;
                        }
                    } else {
                        self.finish_job(&job, RepairStatus::Pending, Some(message.clone()))
                            .await?;
                        summary.retried += 1;
                        warn!(
                            job_id = %job.id,
                            attempts = attempts,
                            error = %message,
                            "Repair attempt failed; job re-queued"
                        );
                    }
                }
            }
        }

        if summary.processed > 0 {
            info!(
                processed = summary.processed,
                succeeded = summary.succeeded,
                retried = summary.retried,
                exhausted = summary.exhausted,
                "Repair pass complete"
            );
        }

        Ok(summary)
    }

    async fn finish_job(
        &self,
        job: &repair_job::Model,
        status: RepairStatus,
        last_error: Option<String>,
    ) -> Result<(), ServiceError> {
        let mut active: repair_job::ActiveModel = job.clone().into();
        active.status = Set(status.as_str().to_string());
        if last_error.is_some() {
            active.last_error = Set(last_error);
        }
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await.map_err(ServiceError::db_error)?;
        Ok(())
    }

    /// One remediation attempt: synthesize missing recipes, repair
    /// mapping defects, then replay the stored request if there is one.
    async fn attempt(&self, job: &repair_job::Model) -> Result<(), ServiceError> {
        let request: Option<DeductionRequest> = match &job.request {
            Some(value) => Some(serde_json::from_value(value.clone())?),
            None => None,
        };

        // Products needing a recipe: line items from the stored request,
        // or the job's own product.
        let mut products: Vec<(Uuid, String)> = Vec::new();
        if let Some(request) = &request {
            for line in &request.line_items {
                products.push((line.product_id, line.product_name.clone()));
            }
        } else if let (Some(product_id), Some(product_name)) = (job.product_id, &job.product_name) {
            products.push((product_id, product_name.clone()));
        }

        for (product_id, product_name) in &products {
            let existing = RecipeEntity::find()
                .filter(recipe::Column::StoreId.eq(job.store_id))
                .filter(recipe::Column::ProductId.eq(*product_id))
                .filter(recipe::Column::Active.eq(true))
                .one(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;
            if existing.is_none() {
                self.synthesize_recipe(job.store_id, *product_id, product_name)
                    .await?;
            }
        }

        // Mapping defects for the store, independent of the recipes we
        // just created.
        let report = self.mapping.validate(Some(job.store_id)).await?;
        if !report.is_clean() {
            let summary = self.mapping.fix(&report).await?;
            if summary.failed > 0 {
                return Err(ServiceError::ExecutionFailure(format!(
                    "{} mapping defects could not be repaired",
                    summary.failed
                )));
            }
        }

        if let Some(request) = &request {
            let validation = self.validator.resolve_and_validate(request).await?;
            if !validation.can_proceed {
                return Err(ServiceError::InsufficientStock(
                    validation.errors.join("; "),
                ));
            }
            self.executor.execute(request).await?;
        }

        Ok(())
    }

    /// Creates a recipe for a product with none: instantiated from the
    /// best-matching template when one clears the threshold, otherwise an
    /// empty shell flagged for manual ingredient entry.
    async fn synthesize_recipe(
        &self,
        store_id: Uuid,
        product_id: Uuid,
        product_name: &str,
    ) -> Result<recipe::Model, ServiceError> {
        let templates = RecipeTemplateEntity::find()
            .filter(recipe_template::Column::Active.eq(true))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let target = normalize_name(product_name);
        let mut best: Option<(&recipe_template::Model, f64)> = None;
        for template in &templates {
            let score = normalized_levenshtein(&target, &normalize_name(&template.name));
            let better = match best {
                Some((_, current)) => score > current,
                None => true,
            };
            if better {
                best = Some((template, score));
            }
        }
        let template = best
            .filter(|(_, score)| *score >= self.template_threshold)
            .map(|(t, score)| (t.clone(), score));

        let now = Utc::now();
        let needs_review = template.is_none();
        let new_recipe = recipe::ActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(store_id),
            product_id: Set(product_id),
            name: Set(product_name.to_string()),
            active: Set(true),
            needs_review: Set(needs_review),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = new_recipe
            .insert(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if let Some((template, score)) = &template {
            info!(
                recipe_id = %created.id,
                template_id = %template.id,
                template_name = %template.name,
                score = *score,
                "Recipe instantiated from template"
            );
            let candidates = InventoryItemEntity::find()
                .filter(inventory_item::Column::StoreId.eq(store_id))
                .filter(inventory_item::Column::Active.eq(true))
                .all(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;

            for line in template.ingredient_lines()? {
                let mapped = matcher::best_match_with_threshold(
                    &line.name,
                    Some(&line.unit),
                    &candidates,
                    self.suggestion_threshold,
                )
                .map(|c| c.item.id);

                let ingredient = recipe_ingredient::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    recipe_id: Set(created.id),
                    ingredient_name: Set(line.name),
                    required_quantity: Set(line.quantity),
                    unit: Set(line.unit),
                    inventory_item_id: Set(mapped),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                ingredient
                    .insert(&*self.db)
                    .await
                    .map_err(ServiceError::db_error)?;
            }
        } else {
            warn!(
                recipe_id = %created.id,
                product = %product_name,
                "No template matched; synthesized an empty recipe shell needing manual entry"
            );
        }

        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::RecipeSynthesized {
                    recipe_id: created.id,
                    product_id,
                    store_id,
                    template_id: template.as_ref().map(|(t, _)| t.id),
                    needs_review,
                })
                .await;
        }

        Ok(created)
    }
}

/// Spawns a background loop that drains pending repair jobs on an
/// interval. Shut down by aborting the handle.
pub fn spawn_repair_worker(
    service: Arc<RepairService>,
    interval: Duration,
    batch_size: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Repair worker started");
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match service.process_pending(batch_size).await {
                Ok(summary) if summary.processed > 0 => {
                    info!(
                        processed = summary.processed,
                        succeeded = summary.succeeded,
                        "Repair worker pass finished"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Repair worker pass failed: {}", e);
                }
            }
        }
    })
}
