use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DriverTarget {
    pub driver_id: String,
    pub target_deliveries: i64,
    pub target_revenue: f64,
    pub current_deliveries: i64,
    pub current_revenue: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DriverTarget {
    pub fn delivery_progress(&self) -> f64 {
        if self.target_deliveries <= 0 {
            return 1.0;
        }
        (self.current_deliveries as f64 / self.target_deliveries as f64).min(1.0)
    }

    pub fn revenue_progress(&self) -> f64 {
        if self.target_revenue <= 0.0 {
            return 1.0;
        }
        (self.current_revenue / self.target_revenue).min(1.0)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub driver_id: String,
    pub date: NaiveDate,
    pub deliveries_completed: i64,
    pub revenue_generated: f64,
    pub target_deliveries: i64,
    pub target_revenue: f64,
    pub target_achieved: bool,
    pub achievement_percent: f64,
}

/// Derived view returned by `GetStatus` / `GetAllStatus`; never persisted
/// directly.
#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    pub target: DriverTarget,
    pub delivery_progress: f64,
    pub revenue_progress: f64,
    pub on_track: bool,
}
