use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "escalation_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationType {
    SlaRisk,
    Stuck,
    UnresponsiveDriver,
    FailedDelivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "severity_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscalationSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "escalation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Open,
    Investigating,
    Resolved,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EscalationLog {
    pub order_id: String,
    pub driver_id: Option<String>,
    #[sqlx(rename = "escalation_type")]
    pub r#type: EscalationType,
    pub severity: EscalationSeverity,
    pub status: EscalationStatus,
    pub reason: String,
    pub current_delay_min: f64,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
