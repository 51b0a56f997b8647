//! Cycle Orchestrator (§4.9): four independent timers, one per engine,
//! combined in a single `tokio::select!` loop. Grounded on the same shape
//! as a scan/process/cleanup delivery processor: per-timer ticks, a shared
//! broadcast shutdown signal, and a bounded drain on the way out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::CycleConfig;
use crate::engines::assignment::AssignmentEngine;
use crate::engines::batching::BatchingEngine;
use crate::engines::escalation::EscalationMonitor;
use crate::engines::optimizer::{Delivery, OptimizeRequest, RouteOptimizer, Vehicle};
use crate::lifecycle::{EngineName, Lifecycle};
use crate::models::OrderStatus;
use crate::persistence::PersistenceGateway;

const JITTER_FRACTION: f64 = 0.10;
const DEFAULT_VEHICLE_CAPACITY_KG: f64 = 200.0;

/// Applies up to ±10% jitter to a base interval, grounded on the spec's
/// cadence table.
fn jittered(base: Duration) -> Duration {
    let fraction = rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
    let delta = base.as_secs_f64() * fraction;
    Duration::from_secs_f64((base.as_secs_f64() + delta).max(1.0))
}

pub struct CycleOrchestrator {
    gateway: Arc<PersistenceGateway>,
    assignment: Arc<AssignmentEngine>,
    optimizer: Arc<RouteOptimizer>,
    batching: Arc<BatchingEngine>,
    escalation: Arc<EscalationMonitor>,
    lifecycle: Arc<Lifecycle>,
    cfg: CycleConfig,
    drain_timeout: Duration,
    dispatch_ticking: AtomicBool,
    routes_ticking: AtomicBool,
    batching_ticking: AtomicBool,
    escalation_ticking: AtomicBool,
}

impl CycleOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<PersistenceGateway>,
        assignment: Arc<AssignmentEngine>,
        optimizer: Arc<RouteOptimizer>,
        batching: Arc<BatchingEngine>,
        escalation: Arc<EscalationMonitor>,
        lifecycle: Arc<Lifecycle>,
        cfg: CycleConfig,
        drain_timeout_ms: u64,
    ) -> Self {
        Self {
            gateway,
            assignment,
            optimizer,
            batching,
            escalation,
            lifecycle,
            cfg,
            drain_timeout: Duration::from_millis(drain_timeout_ms),
            dispatch_ticking: AtomicBool::new(false),
            routes_ticking: AtomicBool::new(false),
            batching_ticking: AtomicBool::new(false),
            escalation_ticking: AtomicBool::new(false),
        }
    }

    /// Runs until `shutdown` fires, then drains outstanding ticks up to
    /// `drain_timeout` before returning.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!("cycle orchestrator starting");

        let mut dispatch_timer = interval(jittered(Duration::from_secs(self.cfg.dispatch_interval_secs)));
        let mut routes_timer = interval(jittered(Duration::from_secs(self.cfg.routes_interval_secs)));
        let mut batching_timer = interval(jittered(Duration::from_secs(self.cfg.batching_interval_secs)));
        let mut escalation_timer = interval(jittered(Duration::from_secs(self.cfg.escalation_interval_secs)));

        // A tick that's still running when the next one comes due is
        // coalesced, not queued — `MissedTickBehavior::Delay` plus the
        // per-engine `*_ticking` flag below gives us that.
        for timer in [&mut dispatch_timer, &mut routes_timer, &mut batching_timer, &mut escalation_timer] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        let mut in_flight = tokio::task::JoinSet::new();

        loop {
            tokio::select! {
                _ = dispatch_timer.tick() => {
                    self.clone().maybe_spawn_dispatch(&mut in_flight);
                }
                _ = routes_timer.tick() => {
                    self.clone().maybe_spawn_routes(&mut in_flight);
                }
                _ = batching_timer.tick() => {
                    self.clone().maybe_spawn_batching(&mut in_flight);
                }
                _ = escalation_timer.tick() => {
                    self.clone().maybe_spawn_escalation(&mut in_flight);
                }
                Some(_) = in_flight.join_next() => {}
                _ = shutdown.recv() => {
                    info!("cycle orchestrator received shutdown signal");
                    break;
                }
            }
        }

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("drain timeout elapsed with ticks still outstanding");
        }
        info!("cycle orchestrator stopped");
    }

    /// A tick's own work runs in a nested `tokio::spawn`, so a panic inside it
    /// (acceptance scenario S6) surfaces as a `JoinError` to the code below
    /// rather than unwinding through this task — the ticking flag always
    /// clears and the panic is always recorded.
    fn maybe_spawn_dispatch(self: Arc<Self>, set: &mut tokio::task::JoinSet<()>) {
        if !self.lifecycle.is_running(EngineName::Dispatch) {
            return;
        }
        if self.dispatch_ticking.swap(true, Ordering::SeqCst) {
            return;
        }
        set.spawn(async move {
            let engine = self.clone();
            let handle = tokio::spawn(async move { engine.run_dispatch_tick().await });
            let result = tokio::time::timeout(Duration::from_secs(20), handle).await;
            let error = match result {
                Ok(Ok(Ok(()))) => None,
                Ok(Ok(Err(err))) => Some(err.to_string()),
                Ok(Err(join_err)) => Some(format!("dispatch tick panicked: {join_err}")),
                Err(_) => Some("dispatch tick exceeded 20s budget".into()),
            };
            if let Some(err) = &error {
                error!(error = %err, "dispatch tick failed");
            }
            self.lifecycle.record_tick(EngineName::Dispatch, Utc::now(), error);
            self.dispatch_ticking.store(false, Ordering::SeqCst);
        });
    }

    fn maybe_spawn_routes(self: Arc<Self>, set: &mut tokio::task::JoinSet<()>) {
        if !self.lifecycle.is_running(EngineName::Routes) {
            return;
        }
        if self.routes_ticking.swap(true, Ordering::SeqCst) {
            return;
        }
        set.spawn(async move {
            let engine = self.clone();
            let handle = tokio::spawn(async move { engine.run_routes_tick().await });
            let result = tokio::time::timeout(Duration::from_secs(60), handle).await;
            let error = match result {
                Ok(Ok(Ok(()))) => None,
                Ok(Ok(Err(err))) => Some(err.to_string()),
                Ok(Err(join_err)) => Some(format!("route re-optimization tick panicked: {join_err}")),
                Err(_) => Some("route re-optimization exceeded 60s budget".into()),
            };
            if let Some(err) = &error {
                error!(error = %err, "route re-optimization tick failed");
            }
            self.lifecycle.record_tick(EngineName::Routes, Utc::now(), error);
            self.routes_ticking.store(false, Ordering::SeqCst);
        });
    }

    fn maybe_spawn_batching(self: Arc<Self>, set: &mut tokio::task::JoinSet<()>) {
        if !self.lifecycle.is_running(EngineName::Batching) {
            return;
        }
        if self.batching_ticking.swap(true, Ordering::SeqCst) {
            return;
        }
        set.spawn(async move {
            let batching = self.batching.clone();
            let handle = tokio::spawn(async move { batching.run(DEFAULT_VEHICLE_CAPACITY_KG).await });
            let result = tokio::time::timeout(Duration::from_secs(30), handle).await;
            let error = match result {
                Ok(Ok(Ok(_))) => None,
                Ok(Ok(Err(err))) => Some(err.to_string()),
                Ok(Err(join_err)) => Some(format!("batching tick panicked: {join_err}")),
                Err(_) => Some("batching tick exceeded 30s budget".into()),
            };
            if let Some(err) = &error {
                error!(error = %err, "batching tick failed");
            }
            self.lifecycle.record_tick(EngineName::Batching, Utc::now(), error);
            self.batching_ticking.store(false, Ordering::SeqCst);
        });
    }

    fn maybe_spawn_escalation(self: Arc<Self>, set: &mut tokio::task::JoinSet<()>) {
        if !self.lifecycle.is_running(EngineName::Escalation) {
            return;
        }
        if self.escalation_ticking.swap(true, Ordering::SeqCst) {
            return;
        }
        set.spawn(async move {
            let escalation = self.escalation.clone();
            let handle = tokio::spawn(async move { escalation.run(Utc::now()).await });
            let result = tokio::time::timeout(Duration::from_secs(20), handle).await;
            let error = match result {
                Ok(Ok(Ok(_))) => None,
                Ok(Ok(Err(err))) => Some(err.to_string()),
                Ok(Err(join_err)) => Some(format!("escalation tick panicked: {join_err}")),
                Err(_) => Some("escalation tick exceeded 20s budget".into()),
            };
            if let Some(err) = &error {
                error!(error = %err, "escalation tick failed");
            }
            self.lifecycle.record_tick(EngineName::Escalation, Utc::now(), error);
            self.escalation_ticking.store(false, Ordering::SeqCst);
        });
    }

    async fn run_dispatch_tick(&self) -> crate::error::AppResult<()> {
        let pending = self.gateway.list_pending_orders().await?;
        if pending.is_empty() {
            return Ok(());
        }
        let outcome = self.assignment.assign_batch(pending).await;
        info!(succeeded = outcome.succeeded.len(), failed = outcome.failed.len(), "dispatch tick complete");
        Ok(())
    }

    async fn run_routes_tick(&self) -> crate::error::AppResult<()> {
        let assigned = self
            .gateway
            .list_active_orders()
            .await?
            .into_iter()
            .filter(|o| o.status == OrderStatus::Assigned)
            .collect::<Vec<_>>();
        if assigned.is_empty() {
            return Ok(());
        }

        let pickups = self.gateway.list_pickups().await?;
        let drivers = self.gateway.list_all_drivers().await?;

        let deliveries: Vec<Delivery> = assigned
            .iter()
            .map(|o| Delivery {
                order_id: o.id.clone(),
                pickup_id: Some(o.pickup_id.clone()),
                lat: o.delivery_lat,
                lng: o.delivery_lng,
                load_kg: o.load_kg,
                sla_deadline: o.sla_deadline,
            })
            .collect();
        let vehicles: Vec<Vehicle> = drivers
            .iter()
            .map(|d| Vehicle { id: format!("veh-{}", d.id), driver_id: d.id.clone(), capacity_kg: d.capacity_kg })
            .collect();

        let output = self
            .optimizer
            .optimize(OptimizeRequest { pickups, deliveries, vehicles, sla_minutes: 0.0 })
            .await?;
        info!(routes = output.routes.len(), degraded = output.degraded, "route re-optimization tick complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jittered_interval_stays_within_ten_percent() {
        let base = Duration::from_secs(100);
        for _ in 0..50 {
            let got = jittered(base);
            assert!(got.as_secs_f64() >= 90.0);
            assert!(got.as_secs_f64() <= 110.0);
        }
    }
}
