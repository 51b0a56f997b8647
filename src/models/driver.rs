use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "driver_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Available,
    Busy,
    Break,
    Offline,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub vehicle_type: String,
    pub capacity_kg: f64,
    pub current_lat: f64,
    pub current_lng: f64,
    pub status: DriverStatus,
    pub last_heartbeat_at: DateTime<Utc>,
    /// Current queue of assigned-but-not-delivered load, kept by the
    /// assignment engine as an in-memory derived counter. Not authoritative —
    /// rebuildable from `orders(assigned_driver_id, status)` at any time.
    pub current_load_kg: f64,
    pub current_deliveries: i64,
    pub current_pickup_id: Option<String>,
}

impl Driver {
    pub fn has_valid_capacity(&self) -> bool {
        self.capacity_kg > 0.0
    }

    pub fn utilization_pct(&self, additional_kg: f64) -> f64 {
        if self.capacity_kg <= 0.0 {
            return 100.0;
        }
        ((self.current_load_kg + additional_kg) / self.capacity_kg) * 100.0
    }
}
