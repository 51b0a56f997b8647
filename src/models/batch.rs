use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "batch_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderBatch {
    pub batch_number: String,
    pub driver_id: Option<String>,
    pub order_ids: sqlx::types::Json<Vec<String>>,
    pub order_count: i32,
    pub total_distance_km: f64,
    pub estimated_duration_min: f64,
    pub delivery_zone: String,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
}
