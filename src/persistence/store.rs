use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::AppResult;
use crate::models::{
    AssignmentLog, AssignmentType, Driver, DriverTarget, EscalationLog, EscalationType, Order,
    OrderBatch, OrderStatus, PerformanceSnapshot, PickupPoint, Route, RouteOptimizationLog,
};

/// Result of a single `Assign` transaction. Bundled so the caller (the
/// assignment engine) doesn't need a second round trip to know whether its
/// write actually landed or raced another caller to the same order.
#[derive(Debug, Clone)]
pub struct AssignOutcome {
    pub order: Order,
    pub already_assigned: bool,
}

/// Typed repository over the external store (§4.11). The core never talks
/// to a database directly — every engine depends on this trait, so the
/// postgres-backed implementation and the in-memory test double are
/// interchangeable.
///
/// Implementations own their own consistency story for the "transactional"
/// operations; the trait only promises that `assign_order` is atomic with
/// respect to `order.status` and the appended `AssignmentLog` row.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_order(&self, order_id: &str) -> AppResult<Option<Order>>;
    async fn list_candidate_drivers(&self, pickup: &PickupPoint) -> AppResult<Vec<Driver>>;
    async fn list_all_drivers(&self) -> AppResult<Vec<Driver>>;
    async fn get_driver(&self, driver_id: &str) -> AppResult<Option<Driver>>;
    async fn list_pickups(&self) -> AppResult<Vec<PickupPoint>>;
    async fn get_pickup(&self, pickup_id: &str) -> AppResult<Option<PickupPoint>>;

    /// Atomically assigns `order_id` to `driver_id` and appends the audit
    /// log row, unless the order is no longer `pending` (in which case
    /// `already_assigned` is set and no log row is written).
    async fn assign_order(
        &self,
        order_id: &str,
        driver_id: &str,
        assignment_type: AssignmentType,
        log: AssignmentLog,
    ) -> AppResult<AssignOutcome>;

    async fn list_pending_orders(&self) -> AppResult<Vec<Order>>;
    async fn list_active_orders(&self) -> AppResult<Vec<Order>>;
    async fn set_order_batch(&self, order_id: &str, batch_id: &str) -> AppResult<()>;
    async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> AppResult<()>;

    async fn upsert_targets(&self, drivers: &[(String, i64, f64)]) -> AppResult<usize>;
    async fn increment_progress(&self, driver_id: &str, deliveries: i64, revenue: f64) -> AppResult<()>;
    async fn get_target(&self, driver_id: &str) -> AppResult<Option<DriverTarget>>;
    async fn list_targets(&self) -> AppResult<Vec<DriverTarget>>;
    async fn upsert_snapshot(&self, snapshot: PerformanceSnapshot) -> AppResult<bool>;
    async fn reset_all_targets(&self) -> AppResult<()>;

    async fn save_routes(&self, routes: &[Route]) -> AppResult<()>;
    async fn append_route_optimization_log(&self, log: RouteOptimizationLog) -> AppResult<()>;
    async fn save_batch(&self, batch: OrderBatch) -> AppResult<()>;

    async fn open_escalation(
        &self,
        order_id: &str,
        escalation_type: EscalationType,
        since: DateTime<Utc>,
    ) -> AppResult<Option<EscalationLog>>;
    async fn append_escalation_log(&self, log: EscalationLog) -> AppResult<()>;
    async fn append_dispatch_alert(&self, alert: crate::models::DispatchAlert) -> AppResult<()>;

    /// Placeholder for `SnapshotDaily(date)` idempotence checks without a
    /// full read of the snapshot row.
    async fn has_snapshot(&self, driver_id: &str, date: NaiveDate) -> AppResult<bool>;
}
