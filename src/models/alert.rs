use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::escalation::EscalationSeverity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "alert_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    DispatchFailed,
    OptimizationNeeded,
    SlaBreach,
    DriverUnresponsive,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DispatchAlert {
    pub order_id: String,
    #[sqlx(rename = "alert_type")]
    pub r#type: AlertType,
    pub severity: EscalationSeverity,
    pub message: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
