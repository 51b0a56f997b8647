use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{AppError, AppResult};
use crate::models::{
    AssignmentLog, AssignmentType, Driver, DriverTarget, EscalationLog, EscalationType, Order,
    OrderBatch, OrderStatus, PerformanceSnapshot, PickupPoint, Route, RouteOptimizationLog,
};

use super::store::{AssignOutcome, Store};

/// In-process `Store` used by engine/unit tests and by local development
/// without a live Postgres. Derived views here are the source of truth
/// (there's no external store behind it), unlike the per-engine caches the
/// spec describes, which must always be rebuildable from a real store.
#[derive(Default)]
pub struct InMemoryStore {
    orders: Mutex<HashMap<String, Order>>,
    drivers: Mutex<HashMap<String, Driver>>,
    pickups: Mutex<HashMap<String, PickupPoint>>,
    targets: Mutex<HashMap<String, DriverTarget>>,
    snapshots: Mutex<HashMap<(String, NaiveDate), PerformanceSnapshot>>,
    assignment_logs: Mutex<Vec<AssignmentLog>>,
    route_logs: Mutex<Vec<RouteOptimizationLog>>,
    routes: Mutex<Vec<Route>>,
    batches: Mutex<Vec<OrderBatch>>,
    escalation_logs: Mutex<Vec<EscalationLog>>,
    alerts: Mutex<Vec<crate::models::DispatchAlert>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_order(&self, order: Order) {
        self.orders.lock().unwrap().insert(order.id.clone(), order);
    }

    pub fn seed_driver(&self, driver: Driver) {
        self.drivers.lock().unwrap().insert(driver.id.clone(), driver);
    }

    pub fn seed_pickup(&self, pickup: PickupPoint) {
        self.pickups.lock().unwrap().insert(pickup.id.clone(), pickup);
    }

    pub fn assignment_log_count(&self) -> usize {
        self.assignment_logs.lock().unwrap().len()
    }

    pub fn escalation_logs(&self) -> Vec<EscalationLog> {
        self.escalation_logs.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<crate::models::DispatchAlert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_order(&self, order_id: &str) -> AppResult<Option<Order>> {
        Ok(self.orders.lock().unwrap().get(order_id).cloned())
    }

    async fn list_candidate_drivers(&self, _pickup: &PickupPoint) -> AppResult<Vec<Driver>> {
        use crate::models::driver::DriverStatus;
        Ok(self
            .drivers
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.status == DriverStatus::Available)
            .cloned()
            .collect())
    }

    async fn list_all_drivers(&self) -> AppResult<Vec<Driver>> {
        Ok(self.drivers.lock().unwrap().values().cloned().collect())
    }

    async fn get_driver(&self, driver_id: &str) -> AppResult<Option<Driver>> {
        Ok(self.drivers.lock().unwrap().get(driver_id).cloned())
    }

    async fn list_pickups(&self) -> AppResult<Vec<PickupPoint>> {
        Ok(self.pickups.lock().unwrap().values().cloned().collect())
    }

    async fn get_pickup(&self, pickup_id: &str) -> AppResult<Option<PickupPoint>> {
        Ok(self.pickups.lock().unwrap().get(pickup_id).cloned())
    }

    async fn assign_order(
        &self,
        order_id: &str,
        driver_id: &str,
        _assignment_type: AssignmentType,
        log: AssignmentLog,
    ) -> AppResult<AssignOutcome> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| AppError::Validation(format!("unknown order {order_id}")))?;

        if order.status != OrderStatus::Pending {
            return Ok(AssignOutcome { order: order.clone(), already_assigned: true });
        }

        order.status = OrderStatus::Assigned;
        order.assigned_driver_id = Some(driver_id.to_string());
        order.last_status_change = Utc::now();

        self.assignment_logs.lock().unwrap().push(log);

        Ok(AssignOutcome { order: order.clone(), already_assigned: false })
    }

    async fn list_pending_orders(&self) -> AppResult<Vec<Order>> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.status == OrderStatus::Pending)
            .cloned()
            .collect())
    }

    async fn list_active_orders(&self) -> AppResult<Vec<Order>> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| !o.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn set_order_batch(&self, order_id: &str, batch_id: &str) -> AppResult<()> {
        if let Some(order) = self.orders.lock().unwrap().get_mut(order_id) {
            order.batch_id = Some(batch_id.to_string());
        }
        Ok(())
    }

    async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> AppResult<()> {
        if let Some(order) = self.orders.lock().unwrap().get_mut(order_id) {
            order.status = status;
            order.last_status_change = Utc::now();
        }
        Ok(())
    }

    async fn upsert_targets(&self, drivers: &[(String, i64, f64)]) -> AppResult<usize> {
        let mut targets = self.targets.lock().unwrap();
        let now = Utc::now();
        for (driver_id, target_deliveries, target_revenue) in drivers {
            targets.insert(
                driver_id.clone(),
                DriverTarget {
                    driver_id: driver_id.clone(),
                    target_deliveries: *target_deliveries,
                    target_revenue: *target_revenue,
                    current_deliveries: 0,
                    current_revenue: 0.0,
                    status: "active".to_string(),
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Ok(drivers.len())
    }

    async fn increment_progress(&self, driver_id: &str, deliveries: i64, revenue: f64) -> AppResult<()> {
        let mut targets = self.targets.lock().unwrap();
        let target = targets
            .get_mut(driver_id)
            .ok_or_else(|| AppError::Validation(format!("no target row for driver {driver_id}")))?;
        target.current_deliveries += deliveries;
        target.current_revenue += revenue;
        target.updated_at = Utc::now();
        Ok(())
    }

    async fn get_target(&self, driver_id: &str) -> AppResult<Option<DriverTarget>> {
        Ok(self.targets.lock().unwrap().get(driver_id).cloned())
    }

    async fn list_targets(&self) -> AppResult<Vec<DriverTarget>> {
        Ok(self.targets.lock().unwrap().values().cloned().collect())
    }

    async fn upsert_snapshot(&self, snapshot: PerformanceSnapshot) -> AppResult<bool> {
        let key = (snapshot.driver_id.clone(), snapshot.date);
        let mut snapshots = self.snapshots.lock().unwrap();
        if snapshots.contains_key(&key) {
            return Ok(false);
        }
        snapshots.insert(key, snapshot);
        Ok(true)
    }

    async fn reset_all_targets(&self) -> AppResult<()> {
        let mut targets = self.targets.lock().unwrap();
        for target in targets.values_mut() {
            target.current_deliveries = 0;
            target.current_revenue = 0.0;
            target.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn save_routes(&self, routes: &[Route]) -> AppResult<()> {
        self.routes.lock().unwrap().extend(routes.iter().cloned());
        Ok(())
    }

    async fn append_route_optimization_log(&self, log: RouteOptimizationLog) -> AppResult<()> {
        self.route_logs.lock().unwrap().push(log);
        Ok(())
    }

    async fn save_batch(&self, batch: OrderBatch) -> AppResult<()> {
        self.batches.lock().unwrap().push(batch);
        Ok(())
    }

    async fn open_escalation(
        &self,
        order_id: &str,
        escalation_type: EscalationType,
        since: DateTime<Utc>,
    ) -> AppResult<Option<EscalationLog>> {
        Ok(self
            .escalation_logs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|log| {
                log.order_id == order_id
                    && log.r#type == escalation_type
                    && log.resolved_at.is_none()
                    && log.created_at >= since
            })
            .cloned())
    }

    async fn append_escalation_log(&self, log: EscalationLog) -> AppResult<()> {
        self.escalation_logs.lock().unwrap().push(log);
        Ok(())
    }

    async fn append_dispatch_alert(&self, alert: crate::models::DispatchAlert) -> AppResult<()> {
        self.alerts.lock().unwrap().push(alert);
        Ok(())
    }

    async fn has_snapshot(&self, driver_id: &str, date: NaiveDate) -> AppResult<bool> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .contains_key(&(driver_id.to_string(), date)))
    }
}
