use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A depot/hub where a driver collects orders before delivering them.
/// Immutable within a planning horizon.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PickupPoint {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub name: String,
}
