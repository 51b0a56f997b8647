use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "assignment_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AssignmentType {
    Auto,
    Force,
    Manual,
}

/// Append-only audit row. Every `Assign` writes exactly one of these, in the
/// same transaction as the order-status update (§5 ordering guarantees).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AssignmentLog {
    pub order_id: String,
    pub driver_id: String,
    pub assignment_type: AssignmentType,
    pub total_score: f64,
    pub distance_score: f64,
    pub time_score: f64,
    pub load_score: f64,
    pub priority_score: f64,
    pub reason: String,
    pub alternatives_count: i32,
    pub created_at: DateTime<Utc>,
}
