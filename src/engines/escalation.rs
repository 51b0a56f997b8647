//! Escalation Monitor (§4.8): detects at-risk and failing deliveries and
//! writes de-duplicated `EscalationLog`/`DispatchAlert` rows.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::AppResult;
use crate::models::{
    AlertType, DispatchAlert, EscalationLog, EscalationSeverity, EscalationStatus, EscalationType,
    Order, OrderStatus,
};
use crate::persistence::PersistenceGateway;

const STUCK_AFTER_MIN: i64 = 45;
const UNRESPONSIVE_AFTER_MIN: i64 = 10;
const FAILED_ATTEMPTS_THRESHOLD: i32 = 2;

pub struct EscalationMonitor {
    gateway: Arc<PersistenceGateway>,
    dedup_window: Duration,
}

impl EscalationMonitor {
    pub fn new(gateway: Arc<PersistenceGateway>, dedup_window_secs: u64) -> Self {
        Self { gateway, dedup_window: Duration::seconds(dedup_window_secs as i64) }
    }

    /// One pass over all active orders. Returns the escalations newly
    /// written this tick (already-open, non-expired duplicates are skipped).
    pub async fn run(&self, now: DateTime<Utc>) -> AppResult<Vec<EscalationLog>> {
        let orders = self.gateway.list_active_orders().await?;
        let mut written = Vec::new();

        for order in &orders {
            if let Some(detection) = self.detect(order, now).await? {
                if let Some(log) = self.record_if_new(detection, now).await? {
                    written.push(log);
                }
            }
        }
        Ok(written)
    }

    async fn detect(&self, order: &Order, now: DateTime<Utc>) -> AppResult<Option<PendingEscalation>> {
        let remaining_min = order.remaining_minutes(now);

        if remaining_min < 30.0 && matches!(order.status, OrderStatus::Pending | OrderStatus::Assigned) {
            let severity = if remaining_min < 10.0 {
                EscalationSeverity::Critical
            } else if remaining_min < 20.0 {
                EscalationSeverity::High
            } else {
                EscalationSeverity::Medium
            };
            return Ok(Some(PendingEscalation {
                order_id: order.id.clone(),
                driver_id: order.assigned_driver_id.clone(),
                escalation_type: EscalationType::SlaRisk,
                severity,
                reason: format!("{remaining_min:.1} minutes remain before SLA breach"),
                current_delay_min: -remaining_min,
            }));
        }

        if order.status == OrderStatus::PickedUp {
            let stuck_min = (now - order.last_status_change).num_minutes();
            if stuck_min > STUCK_AFTER_MIN {
                return Ok(Some(PendingEscalation {
                    order_id: order.id.clone(),
                    driver_id: order.assigned_driver_id.clone(),
                    escalation_type: EscalationType::Stuck,
                    severity: EscalationSeverity::High,
                    reason: format!("stuck in pickedUp for {stuck_min} minutes"),
                    current_delay_min: stuck_min as f64,
                }));
            }
        }

        if let Some(driver_id) = &order.assigned_driver_id {
            if let Some(driver) = self.gateway.get_driver(driver_id).await? {
                use crate::models::DriverStatus;
                let idle_min = (now - driver.last_heartbeat_at).num_minutes();
                if driver.status != DriverStatus::Offline && idle_min > UNRESPONSIVE_AFTER_MIN {
                    return Ok(Some(PendingEscalation {
                        order_id: order.id.clone(),
                        driver_id: Some(driver_id.clone()),
                        escalation_type: EscalationType::UnresponsiveDriver,
                        severity: EscalationSeverity::High,
                        reason: format!("driver heartbeat is {idle_min} minutes stale"),
                        current_delay_min: idle_min as f64,
                    }));
                }
            }
        }

        if order.status == OrderStatus::Failed && order.attempts >= FAILED_ATTEMPTS_THRESHOLD {
            return Ok(Some(PendingEscalation {
                order_id: order.id.clone(),
                driver_id: order.assigned_driver_id.clone(),
                escalation_type: EscalationType::FailedDelivery,
                severity: EscalationSeverity::Critical,
                reason: format!("{} failed delivery attempts", order.attempts),
                current_delay_min: 0.0,
            }));
        }

        Ok(None)
    }

    async fn record_if_new(&self, detection: PendingEscalation, now: DateTime<Utc>) -> AppResult<Option<EscalationLog>> {
        let since = now - self.dedup_window;
        if self
            .gateway
            .open_escalation(&detection.order_id, detection.escalation_type, since)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let log = EscalationLog {
            order_id: detection.order_id.clone(),
            driver_id: detection.driver_id,
            r#type: detection.escalation_type,
            severity: detection.severity,
            status: EscalationStatus::Open,
            reason: detection.reason.clone(),
            current_delay_min: detection.current_delay_min,
            created_at: now,
            resolved_at: None,
        };
        self.gateway.append_escalation_log(log.clone()).await?;

        if detection.severity == EscalationSeverity::Critical {
            let alert = DispatchAlert {
                order_id: detection.order_id,
                r#type: AlertType::SlaBreach,
                severity: detection.severity,
                message: detection.reason,
                resolved: false,
                created_at: now,
                resolved_at: None,
            };
            self.gateway.append_dispatch_alert(alert).await?;
        }

        Ok(Some(log))
    }
}

struct PendingEscalation {
    order_id: String,
    driver_id: Option<String>,
    escalation_type: EscalationType,
    severity: EscalationSeverity,
    reason: String,
    current_delay_min: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Driver, DriverStatus};
    use crate::persistence::InMemoryStore;

    fn order_with(status: OrderStatus, remaining_min: i64, last_change_min_ago: i64, attempts: i32) -> Order {
        let now = Utc::now();
        Order {
            id: "o1".into(),
            customer_ref: "c".into(),
            pickup_id: "P1".into(),
            delivery_lat: 24.71,
            delivery_lng: 46.67,
            load_kg: 10.0,
            priority: 5,
            revenue: 20.0,
            created_at: now - Duration::hours(1),
            sla_deadline: now + Duration::minutes(remaining_min),
            status,
            assigned_driver_id: Some("d1".into()),
            batch_id: None,
            attempts,
            last_status_change: now - Duration::minutes(last_change_min_ago),
        }
    }

    fn monitor() -> (EscalationMonitor, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(PersistenceGateway::new(
            store.clone(),
            crate::config::StoreTimeouts::default(),
            crate::config::BreakerConfig::default(),
        ));
        (EscalationMonitor::new(gateway, 1800), store)
    }

    #[tokio::test]
    async fn flags_sla_risk_under_30_minutes_remaining() {
        let (monitor, store) = monitor();
        store.seed_order(order_with(OrderStatus::Pending, 15, 0, 0));

        let escalations = monitor.run(Utc::now()).await.unwrap();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].r#type, EscalationType::SlaRisk);
        assert_eq!(escalations[0].severity, EscalationSeverity::High);
    }

    #[tokio::test]
    async fn flags_stuck_after_forty_five_minutes_in_picked_up() {
        let (monitor, store) = monitor();
        store.seed_order(order_with(OrderStatus::PickedUp, 200, 50, 0));

        let escalations = monitor.run(Utc::now()).await.unwrap();
        assert_eq!(escalations[0].r#type, EscalationType::Stuck);
    }

    #[tokio::test]
    async fn flags_unresponsive_driver_on_stale_heartbeat() {
        let (monitor, store) = monitor();
        store.seed_order(order_with(OrderStatus::Assigned, 200, 0, 0));
        store.seed_driver(Driver {
            id: "d1".into(),
            name: "d1".into(),
            vehicle_type: "van".into(),
            capacity_kg: 200.0,
            current_lat: 24.71,
            current_lng: 46.67,
            status: DriverStatus::Busy,
            last_heartbeat_at: Utc::now() - Duration::minutes(15),
            current_load_kg: 0.0,
            current_deliveries: 0,
            current_pickup_id: None,
        });

        let escalations = monitor.run(Utc::now()).await.unwrap();
        assert!(escalations.iter().any(|e| e.r#type == EscalationType::UnresponsiveDriver));
    }

    #[tokio::test]
    async fn does_not_duplicate_within_the_dedup_window() {
        let (monitor, store) = monitor();
        store.seed_order(order_with(OrderStatus::Pending, 15, 0, 0));

        let now = Utc::now();
        let first = monitor.run(now).await.unwrap();
        let second = monitor.run(now + Duration::minutes(5)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 0);
    }
}
