use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a repair job. `Success` and `Failed` are terminal;
/// a job never disappears without reaching one of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepairStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl RepairStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStatus::Pending => "pending",
            RepairStatus::Processing => "processing",
            RepairStatus::Success => "success",
            RepairStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RepairStatus::Pending),
            "processing" => Some(RepairStatus::Processing),
            "success" => Some(RepairStatus::Success),
            "failed" => Some(RepairStatus::Failed),
            _ => None,
        }
    }
}

/// Durable record of one remediation effort. `request` carries the
/// serialized deduction request so a retry survives process restarts.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "repair_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub product_name: Option<String>,
    pub store_id: Uuid,
    pub request: Option<Json>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub status: String,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
