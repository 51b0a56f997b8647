//! Assignment Engine (§4.5): scores candidate drivers for a pending order
//! and writes the winning assignment transactionally.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::ScorerConfig;
use crate::error::{AppError, AppResult};
use crate::geo::Coord;
use crate::models::{AlertType, AssignmentLog, AssignmentType, Driver, DispatchAlert, EscalationSeverity, Order, OrderStatus};
use crate::persistence::PersistenceGateway;
use crate::scoring::{self, ScoreBreakdown, ScoringContext};
use crate::urgency::{self, Urgency};

const ASSIGN_BUDGET: Duration = Duration::from_secs(2);
const STORE_READ_BUDGET: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct AlternativeDriver {
    pub driver_id: String,
    pub total_score: f64,
}

#[derive(Debug, Clone)]
pub struct AssignmentResult {
    pub driver_id: String,
    pub urgency: Urgency,
    pub score: ScoreBreakdown,
    pub alternatives: Vec<AlternativeDriver>,
    pub already_assigned: bool,
}

#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub order_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<AssignmentResult>,
    pub failed: Vec<BatchFailure>,
}

pub struct AssignmentEngine {
    gateway: Arc<PersistenceGateway>,
    cfg: ScorerConfig,
}

impl AssignmentEngine {
    pub fn new(gateway: Arc<PersistenceGateway>, cfg: ScorerConfig) -> Self {
        Self { gateway, cfg }
    }

    pub async fn assign(&self, order_id: &str) -> AppResult<AssignmentResult> {
        match timeout(ASSIGN_BUDGET, self.assign_inner(order_id)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(ASSIGN_BUDGET)),
        }
    }

    async fn assign_inner(&self, order_id: &str) -> AppResult<AssignmentResult> {
        let order = timeout(STORE_READ_BUDGET, self.gateway.get_order(order_id))
            .await
            .map_err(|_| AppError::Timeout(STORE_READ_BUDGET))??
            .ok_or_else(|| AppError::Validation(format!("unknown order {order_id}")))?;

        if order.status != OrderStatus::Pending {
            // Idempotent on already-assigned orders: report the existing
            // driver rather than erroring.
            let driver_id = order
                .assigned_driver_id
                .clone()
                .ok_or_else(|| AppError::Conflict(format!("order {order_id} is not pending and has no driver")))?;
            let now = Utc::now();
            let urgency = urgency::classify(order.created_at, order.sla_deadline, now);
            return Ok(AssignmentResult {
                driver_id,
                urgency,
                score: ScoreBreakdown { distance: 0.0, time: 0.0, load: 0.0, priority: 0.0, route_affinity: 0.0, total: 0.0 },
                alternatives: vec![],
                already_assigned: true,
            });
        }

        let pickup = timeout(STORE_READ_BUDGET, self.gateway.get_pickup(&order.pickup_id))
            .await
            .map_err(|_| AppError::Timeout(STORE_READ_BUDGET))??
            .ok_or_else(|| AppError::Validation(format!("unknown pickup {}", order.pickup_id)))?;
        let pickup_coord = Coord::new(pickup.lat, pickup.lng);

        let candidates = timeout(STORE_READ_BUDGET, self.gateway.list_candidate_drivers(&pickup))
            .await
            .map_err(|_| AppError::Timeout(STORE_READ_BUDGET))??;

        let now = Utc::now();
        let urgency = urgency::classify(order.created_at, order.sla_deadline, now);

        let mut scored: Vec<(Driver, ScoreBreakdown)> = Vec::new();
        for d in candidates {
            if !scoring::passes_hard_gates(&d, order.load_kg, Some(self.cfg.max_dist_km), pickup_coord) {
                continue;
            }
            // Neediest driver (lowest combined delivery/revenue progress
            // toward target) should score best on the time sub-score.
            let driver_progress = timeout(STORE_READ_BUDGET, self.gateway.get_target(&d.id))
                .await
                .map_err(|_| AppError::Timeout(STORE_READ_BUDGET))??
                .map(|t| (t.delivery_progress() + t.revenue_progress()) / 2.0)
                .unwrap_or(0.0);
            let ctx = ScoringContext {
                pickup: pickup_coord,
                order_load_kg: order.load_kg,
                order_priority: order.priority,
                driver_progress,
                order_pickup_id_matches_driver_route: d.current_pickup_id.as_deref() == Some(order.pickup_id.as_str()),
                driver_has_active_route: d.current_pickup_id.is_some(),
            };
            let score = scoring::score(&d, &ctx, &self.cfg);
            scored.push((d, score));
        }

        if scored.is_empty() {
            let alert = DispatchAlert {
                order_id: order.id.clone(),
                r#type: AlertType::DispatchFailed,
                severity: EscalationSeverity::High,
                message: "no driver passed hard gates".into(),
                resolved: false,
                created_at: now,
                resolved_at: None,
            };
            let _ = self.gateway.append_dispatch_alert(alert).await;
            return Err(AppError::NoCapacity(format!("no driver available for order {order_id}")));
        }

        // Lowest total score wins; ties broken by lower currentDeliveries,
        // then lexicographic driverId.
        scored.sort_by(|(da, sa), (db, sb)| {
            sa.total
                .partial_cmp(&sb.total)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(da.current_deliveries.cmp(&db.current_deliveries))
                .then(da.id.cmp(&db.id))
        });

        let (winner, winner_score) = scored[0].clone();
        let alternatives: Vec<AlternativeDriver> = scored
            .iter()
            .skip(1)
            .take(3)
            .map(|(d, s)| AlternativeDriver { driver_id: d.id.clone(), total_score: s.total })
            .collect();

        let log = AssignmentLog {
            order_id: order.id.clone(),
            driver_id: winner.id.clone(),
            assignment_type: AssignmentType::Auto,
            total_score: winner_score.total,
            distance_score: winner_score.distance,
            time_score: winner_score.time,
            load_score: winner_score.load,
            priority_score: winner_score.priority,
            reason: format!("lowest score among {} candidates", scored.len()),
            alternatives_count: alternatives.len() as i32,
            created_at: now,
        };

        let outcome = timeout(
            STORE_READ_BUDGET,
            self.gateway.assign_order(&order.id, &winner.id, AssignmentType::Auto, log),
        )
        .await
        .map_err(|_| AppError::Timeout(STORE_READ_BUDGET))??;

        if outcome.already_assigned {
            info!(order_id = %order.id, "lost the race to assign this order");
        }

        Ok(AssignmentResult {
            driver_id: winner.id,
            urgency,
            score: winner_score,
            alternatives,
            already_assigned: outcome.already_assigned,
        })
    }

    /// Sorted by `(priorityBoost desc, createdAt asc)`. Failures are isolated
    /// per order; the batch never aborts early.
    pub async fn assign_batch(&self, orders: Vec<Order>) -> BatchOutcome {
        let mut ordered = orders;
        ordered.sort_by(|a, b| {
            let ua = urgency::classify(a.created_at, a.sla_deadline, Utc::now());
            let ub = urgency::classify(b.created_at, b.sla_deadline, Utc::now());
            ub.priority_boost.cmp(&ua.priority_boost).then(a.created_at.cmp(&b.created_at))
        });

        let mut outcome = BatchOutcome::default();
        for order in ordered {
            match self.assign(&order.id).await {
                Ok(result) => outcome.succeeded.push(result),
                Err(err) => {
                    warn!(order_id = %order.id, error = %err, "assignment failed in batch");
                    outcome.failed.push(BatchFailure { order_id: order.id, reason: err.to_string() });
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Driver, DriverStatus, PickupPoint};
    use crate::persistence::InMemoryStore;
    use chrono::Duration as ChronoDuration;

    fn make_order(id: &str, priority: i32, sla_min: i64) -> Order {
        let now = Utc::now();
        Order {
            id: id.into(),
            customer_ref: "c1".into(),
            pickup_id: "p1".into(),
            delivery_lat: 24.72,
            delivery_lng: 46.68,
            load_kg: 10.0,
            priority,
            revenue: 50.0,
            created_at: now,
            sla_deadline: now + ChronoDuration::minutes(sla_min),
            status: OrderStatus::Pending,
            assigned_driver_id: None,
            batch_id: None,
            attempts: 0,
            last_status_change: now,
        }
    }

    fn make_driver(id: &str) -> Driver {
        Driver {
            id: id.into(),
            name: id.into(),
            vehicle_type: "van".into(),
            capacity_kg: 200.0,
            current_lat: 24.7136,
            current_lng: 46.6753,
            status: DriverStatus::Available,
            last_heartbeat_at: Utc::now(),
            current_load_kg: 0.0,
            current_deliveries: 0,
            current_pickup_id: None,
        }
    }

    fn engine_with_store(store: Arc<InMemoryStore>) -> AssignmentEngine {
        let gateway = Arc::new(PersistenceGateway::new(
            store,
            crate::config::StoreTimeouts::default(),
            crate::config::BreakerConfig::default(),
        ));
        AssignmentEngine::new(gateway, ScorerConfig::default())
    }

    #[tokio::test]
    async fn assigns_the_only_available_driver() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_pickup(PickupPoint { id: "p1".into(), lat: 24.7136, lng: 46.6753, name: "Hub".into() });
        store.seed_driver(make_driver("d1"));
        store.seed_order(make_order("o1", 5, 90));

        let engine = engine_with_store(store);
        let result = engine.assign("o1").await.unwrap();
        assert_eq!(result.driver_id, "d1");
        assert!(!result.already_assigned);
    }

    #[tokio::test]
    async fn returns_no_capacity_when_no_driver_passes_gates() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_pickup(PickupPoint { id: "p1".into(), lat: 24.7136, lng: 46.6753, name: "Hub".into() });
        let mut busy = make_driver("d1");
        busy.status = DriverStatus::Busy;
        store.seed_driver(busy);
        store.seed_order(make_order("o1", 5, 90));

        let engine = engine_with_store(store);
        let err = engine.assign("o1").await.unwrap_err();
        assert!(matches!(err, AppError::NoCapacity(_)));
    }

    #[tokio::test]
    async fn second_assign_on_same_order_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_pickup(PickupPoint { id: "p1".into(), lat: 24.7136, lng: 46.6753, name: "Hub".into() });
        store.seed_driver(make_driver("d1"));
        store.seed_driver(make_driver("d2"));
        store.seed_order(make_order("o1", 5, 90));

        let engine = engine_with_store(store.clone());
        let first = engine.assign("o1").await.unwrap();
        let second = engine.assign("o1").await.unwrap();

        assert!(!first.already_assigned);
        assert!(second.already_assigned);
        assert_eq!(second.driver_id, first.driver_id);
        assert_eq!(store.assignment_log_count(), 1);
    }

    #[tokio::test]
    async fn batch_isolates_per_order_failures() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_pickup(PickupPoint { id: "p1".into(), lat: 24.7136, lng: 46.6753, name: "Hub".into() });
        store.seed_driver(make_driver("d1"));
        let good = make_order("good", 5, 90);
        store.seed_order(good.clone());

        let engine = engine_with_store(store);
        let mut bad = make_order("bad", 1, 400);
        bad.id = "bad-not-seeded".into();

        let outcome = engine.assign_batch(vec![good, bad]).await;
        assert_eq!(outcome.succeeded.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].order_id, "bad-not-seeded");
    }
}
