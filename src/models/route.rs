use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "route_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Planned,
    Dispatched,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStop {
    pub order_id: String,
    pub arrival_time_estimate: DateTime<Utc>,
    pub service_time_min: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub driver_id: String,
    pub vehicle_id: String,
    pub pickup_id: String,
    pub ordered_stops: Vec<RouteStop>,
    pub total_distance_km: f64,
    pub total_duration_min: f64,
    pub status: RouteStatus,
    pub created_at: DateTime<Utc>,
    pub optimized_at: Option<DateTime<Utc>>,
}

impl Route {
    pub fn total_load_kg(&self, load_by_order: &std::collections::HashMap<String, f64>) -> f64 {
        self.ordered_stops
            .iter()
            .filter_map(|stop| load_by_order.get(&stop.order_id))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "optimization_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    Ok,
    FailedFallback,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RouteOptimizationLog {
    pub driver_id: String,
    pub order_ids: sqlx::types::Json<Vec<String>>,
    pub original_distance: f64,
    pub optimized_distance: f64,
    pub distance_saved_km: f64,
    pub time_saved_min: f64,
    pub stops_reordered: i32,
    pub improvement_pct: f64,
    pub algorithm: String,
    pub status: OptimizationStatus,
    pub created_at: DateTime<Utc>,
    pub optimized_at: DateTime<Utc>,
}
