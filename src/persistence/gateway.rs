use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::time::timeout;
use tracing::warn;

use crate::config::{BreakerConfig, StoreTimeouts};
use crate::error::{AppError, AppResult};
use crate::models::{
    AssignmentLog, AssignmentType, Driver, DriverTarget, EscalationLog, EscalationType, Order,
    OrderBatch, OrderStatus, PerformanceSnapshot, PickupPoint, Route, RouteOptimizationLog,
};

use super::store::{AssignOutcome, Store};

/// Breaker state tracked with a couple of atomics rather than a mutexed enum;
/// the only transitions that matter are "count up on timeout" and "check if
/// the open window has elapsed", both of which are cheap to do lock-free.
struct Breaker {
    cfg: BreakerConfig,
    consecutive_timeouts: AtomicU32,
    opened_at_epoch_ms: AtomicU64,
}

impl Breaker {
    fn new(cfg: BreakerConfig) -> Self {
        Self { cfg, consecutive_timeouts: AtomicU32::new(0), opened_at_epoch_ms: AtomicU64::new(0) }
    }

    fn is_open(&self, now: DateTime<Utc>) -> bool {
        let opened = self.opened_at_epoch_ms.load(Ordering::Relaxed);
        if opened == 0 {
            return false;
        }
        let elapsed_ms = now.timestamp_millis().saturating_sub(opened as i64);
        elapsed_ms < (self.cfg.open_secs as i64) * 1000
    }

    fn record_timeout(&self, now: DateTime<Utc>) {
        let count = self.consecutive_timeouts.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= self.cfg.failure_threshold {
            self.opened_at_epoch_ms.store(now.timestamp_millis() as u64, Ordering::Relaxed);
        }
    }

    fn record_success(&self) {
        self.consecutive_timeouts.store(0, Ordering::Relaxed);
        self.opened_at_epoch_ms.store(0, Ordering::Relaxed);
    }
}

/// Outcome of a gated read: either fresh, or served from the last-known-good
/// cache while the breaker is open.
pub struct Staleness<T> {
    pub value: T,
    pub stale: bool,
}

/// Wraps any `Store` with per-call deadlines and a circuit breaker (§4.11).
/// This is the only component that talks to the inner store directly; every
/// engine depends on `PersistenceGateway`, never on `Store` itself.
pub struct PersistenceGateway {
    inner: Arc<dyn Store>,
    timeouts: StoreTimeouts,
    breaker: Breaker,
    last_good_orders: std::sync::Mutex<Option<Vec<Order>>>,
    last_good_drivers: std::sync::Mutex<Option<Vec<Driver>>>,
}

impl PersistenceGateway {
    pub fn new(inner: Arc<dyn Store>, timeouts: StoreTimeouts, breaker_cfg: BreakerConfig) -> Self {
        Self {
            inner,
            timeouts,
            breaker: Breaker::new(breaker_cfg),
            last_good_orders: std::sync::Mutex::new(None),
            last_good_drivers: std::sync::Mutex::new(None),
        }
    }

    async fn guarded_read<T, F>(&self, budget_ms: u64, fut: F) -> AppResult<T>
    where
        F: std::future::Future<Output = AppResult<T>>,
    {
        if self.breaker.is_open(Utc::now()) {
            return Err(AppError::StoreUnavailable("circuit breaker open".into()));
        }
        match timeout(Duration::from_millis(budget_ms), fut).await {
            Ok(Ok(value)) => {
                self.breaker.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                if err.is_transient() {
                    self.breaker.record_timeout(Utc::now());
                }
                Err(err)
            }
            Err(_) => {
                warn!(budget_ms, "store read exceeded deadline");
                self.breaker.record_timeout(Utc::now());
                Err(AppError::Timeout(Duration::from_millis(budget_ms)))
            }
        }
    }

    async fn guarded_mutation<T, F>(&self, budget_ms: u64, fut: F) -> AppResult<T>
    where
        F: std::future::Future<Output = AppResult<T>>,
    {
        // Mutations never serve a stale fallback; they fail closed while open.
        self.guarded_read(budget_ms, fut).await
    }

    /// Read-with-fallback variant for the handful of callers (driver/order
    /// listings feeding the optimizer and escalation monitor) who would
    /// rather see a stale snapshot than nothing while the breaker is open.
    pub async fn list_all_drivers_or_stale(&self) -> AppResult<Staleness<Vec<Driver>>> {
        if self.breaker.is_open(Utc::now()) {
            if let Some(cached) = self.last_good_drivers.lock().unwrap().clone() {
                return Ok(Staleness { value: cached, stale: true });
            }
            return Err(AppError::StoreUnavailable("circuit breaker open, no cached drivers".into()));
        }
        let drivers = self.guarded_read(self.timeouts.read_ms, self.inner.list_all_drivers()).await?;
        *self.last_good_drivers.lock().unwrap() = Some(drivers.clone());
        Ok(Staleness { value: drivers, stale: false })
    }

    pub async fn list_active_orders_or_stale(&self) -> AppResult<Staleness<Vec<Order>>> {
        if self.breaker.is_open(Utc::now()) {
            if let Some(cached) = self.last_good_orders.lock().unwrap().clone() {
                return Ok(Staleness { value: cached, stale: true });
            }
            return Err(AppError::StoreUnavailable("circuit breaker open, no cached orders".into()));
        }
        let orders = self.guarded_read(self.timeouts.read_ms, self.inner.list_active_orders()).await?;
        *self.last_good_orders.lock().unwrap() = Some(orders.clone());
        Ok(Staleness { value: orders, stale: false })
    }

    pub async fn get_order(&self, order_id: &str) -> AppResult<Option<Order>> {
        self.guarded_read(self.timeouts.read_ms, self.inner.get_order(order_id)).await
    }

    pub async fn list_candidate_drivers(&self, pickup: &PickupPoint) -> AppResult<Vec<Driver>> {
        self.guarded_read(self.timeouts.read_ms, self.inner.list_candidate_drivers(pickup)).await
    }

    pub async fn get_driver(&self, driver_id: &str) -> AppResult<Option<Driver>> {
        self.guarded_read(self.timeouts.read_ms, self.inner.get_driver(driver_id)).await
    }

    pub async fn list_all_drivers(&self) -> AppResult<Vec<Driver>> {
        self.guarded_read(self.timeouts.metrics_ms, self.inner.list_all_drivers()).await
    }

    pub async fn list_pickups(&self) -> AppResult<Vec<PickupPoint>> {
        self.guarded_read(self.timeouts.metrics_ms, self.inner.list_pickups()).await
    }

    pub async fn get_pickup(&self, pickup_id: &str) -> AppResult<Option<PickupPoint>> {
        self.guarded_read(self.timeouts.read_ms, self.inner.get_pickup(pickup_id)).await
    }

    pub async fn assign_order(
        &self,
        order_id: &str,
        driver_id: &str,
        assignment_type: AssignmentType,
        log: AssignmentLog,
    ) -> AppResult<AssignOutcome> {
        self.guarded_mutation(
            self.timeouts.mutation_ms,
            self.inner.assign_order(order_id, driver_id, assignment_type, log),
        )
        .await
    }

    pub async fn list_pending_orders(&self) -> AppResult<Vec<Order>> {
        self.guarded_read(self.timeouts.read_ms, self.inner.list_pending_orders()).await
    }

    pub async fn list_active_orders(&self) -> AppResult<Vec<Order>> {
        self.guarded_read(self.timeouts.read_ms, self.inner.list_active_orders()).await
    }

    pub async fn set_order_batch(&self, order_id: &str, batch_id: &str) -> AppResult<()> {
        self.guarded_mutation(self.timeouts.mutation_ms, self.inner.set_order_batch(order_id, batch_id))
            .await
    }

    pub async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> AppResult<()> {
        self.guarded_mutation(self.timeouts.mutation_ms, self.inner.set_order_status(order_id, status))
            .await
    }

    pub async fn upsert_targets(&self, drivers: &[(String, i64, f64)]) -> AppResult<usize> {
        self.guarded_mutation(self.timeouts.mutation_ms, self.inner.upsert_targets(drivers)).await
    }

    pub async fn increment_progress(&self, driver_id: &str, deliveries: i64, revenue: f64) -> AppResult<()> {
        self.guarded_mutation(
            self.timeouts.mutation_ms,
            self.inner.increment_progress(driver_id, deliveries, revenue),
        )
        .await
    }

    pub async fn get_target(&self, driver_id: &str) -> AppResult<Option<DriverTarget>> {
        self.guarded_read(self.timeouts.read_ms, self.inner.get_target(driver_id)).await
    }

    pub async fn list_targets(&self) -> AppResult<Vec<DriverTarget>> {
        self.guarded_read(self.timeouts.metrics_ms, self.inner.list_targets()).await
    }

    pub async fn upsert_snapshot(&self, snapshot: PerformanceSnapshot) -> AppResult<bool> {
        self.guarded_mutation(self.timeouts.mutation_ms, self.inner.upsert_snapshot(snapshot)).await
    }

    pub async fn reset_all_targets(&self) -> AppResult<()> {
        self.guarded_mutation(self.timeouts.mutation_ms, self.inner.reset_all_targets()).await
    }

    pub async fn save_routes(&self, routes: &[Route]) -> AppResult<()> {
        self.guarded_mutation(self.timeouts.mutation_ms, self.inner.save_routes(routes)).await
    }

    pub async fn append_route_optimization_log(&self, log: RouteOptimizationLog) -> AppResult<()> {
        self.guarded_mutation(self.timeouts.mutation_ms, self.inner.append_route_optimization_log(log))
            .await
    }

    pub async fn save_batch(&self, batch: OrderBatch) -> AppResult<()> {
        self.guarded_mutation(self.timeouts.mutation_ms, self.inner.save_batch(batch)).await
    }

    pub async fn open_escalation(
        &self,
        order_id: &str,
        escalation_type: EscalationType,
        since: DateTime<Utc>,
    ) -> AppResult<Option<EscalationLog>> {
        self.guarded_read(self.timeouts.read_ms, self.inner.open_escalation(order_id, escalation_type, since))
            .await
    }

    pub async fn append_escalation_log(&self, log: EscalationLog) -> AppResult<()> {
        self.guarded_mutation(self.timeouts.mutation_ms, self.inner.append_escalation_log(log)).await
    }

    pub async fn append_dispatch_alert(&self, alert: crate::models::DispatchAlert) -> AppResult<()> {
        self.guarded_mutation(self.timeouts.mutation_ms, self.inner.append_dispatch_alert(alert)).await
    }

    pub async fn has_snapshot(&self, driver_id: &str, date: NaiveDate) -> AppResult<bool> {
        self.guarded_read(self.timeouts.read_ms, self.inner.has_snapshot(driver_id, date)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::InMemoryStore;

    fn gateway() -> PersistenceGateway {
        PersistenceGateway::new(
            Arc::new(InMemoryStore::new()),
            StoreTimeouts::default(),
            BreakerConfig { failure_threshold: 3, open_secs: 120 },
        )
    }

    #[tokio::test]
    async fn breaker_starts_closed() {
        let gw = gateway();
        assert!(!gw.breaker.is_open(Utc::now()));
    }

    #[test]
    fn breaker_opens_after_threshold_consecutive_timeouts() {
        let breaker = Breaker::new(BreakerConfig { failure_threshold: 3, open_secs: 120 });
        let now = Utc::now();
        breaker.record_timeout(now);
        breaker.record_timeout(now);
        assert!(!breaker.is_open(now));
        breaker.record_timeout(now);
        assert!(breaker.is_open(now));
    }

    #[test]
    fn breaker_closes_after_open_window_elapses() {
        let breaker = Breaker::new(BreakerConfig { failure_threshold: 1, open_secs: 120 });
        let now = Utc::now();
        breaker.record_timeout(now);
        assert!(breaker.is_open(now));
        let later = now + chrono::Duration::seconds(121);
        assert!(!breaker.is_open(later));
    }

    #[test]
    fn success_resets_the_failure_count() {
        let breaker = Breaker::new(BreakerConfig { failure_threshold: 2, open_secs: 120 });
        let now = Utc::now();
        breaker.record_timeout(now);
        breaker.record_success();
        breaker.record_timeout(now);
        assert!(!breaker.is_open(now));
    }
}
