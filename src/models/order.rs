use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
    Failed,
}

impl OrderStatus {
    /// Terminal statuses never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Failed)
    }

    /// Whether `self -> next` is a legal edge in the order status DAG.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Pending, Cancelled)
                | (Assigned, PickedUp)
                | (Assigned, Pending) // escalation can clear an assignment
                | (Assigned, Cancelled)
                | (PickedUp, InTransit)
                | (PickedUp, Failed)
                | (InTransit, Delivered)
                | (InTransit, Failed)
        )
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer_ref: String,
    pub pickup_id: String,
    pub delivery_lat: f64,
    pub delivery_lng: f64,
    pub load_kg: f64,
    pub priority: i32,
    pub revenue: f64,
    pub created_at: DateTime<Utc>,
    pub sla_deadline: DateTime<Utc>,
    pub status: OrderStatus,
    pub assigned_driver_id: Option<String>,
    pub batch_id: Option<String>,
    pub attempts: i32,
    pub last_status_change: DateTime<Utc>,
}

impl Order {
    /// `slaDeadline > createdAt` is a data-entry invariant, checked once at
    /// ingest rather than on every read.
    pub fn has_valid_sla(&self) -> bool {
        self.sla_deadline > self.created_at
    }

    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> f64 {
        (self.sla_deadline - now).num_milliseconds() as f64 / 60_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_reject_every_transition() {
        for next in [
            OrderStatus::Pending,
            OrderStatus::Assigned,
            OrderStatus::PickedUp,
            OrderStatus::InTransit,
            OrderStatus::Delivered,
        ] {
            assert!(!OrderStatus::Delivered.can_transition_to(next));
            assert!(!OrderStatus::Cancelled.can_transition_to(next));
            assert!(!OrderStatus::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn pending_can_become_assigned_or_cancelled_only() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Assigned));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::PickedUp));
    }
}
