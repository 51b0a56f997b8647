//! Batching Engine (§4.7): groups pending, unassigned orders that share a
//! delivery zone and whose combined load fits a candidate vehicle.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppResult;
use crate::geo::{haversine_km, Coord};
use crate::models::{BatchStatus, Order, OrderBatch};
use crate::persistence::PersistenceGateway;

const DEFAULT_ZONE_RADIUS_KM: f64 = 3.0;

pub struct BatchingEngine {
    gateway: Arc<PersistenceGateway>,
    zone_radius_km: f64,
}

impl BatchingEngine {
    pub fn new(gateway: Arc<PersistenceGateway>) -> Self {
        Self { gateway, zone_radius_km: DEFAULT_ZONE_RADIUS_KM }
    }

    pub fn with_zone_radius_km(gateway: Arc<PersistenceGateway>, zone_radius_km: f64) -> Self {
        Self { gateway, zone_radius_km }
    }

    /// Scans pending, unbatched orders, groups them by pickup and delivery
    /// proximity, and writes an `OrderBatch` for every group whose combined
    /// load fits `vehicle_capacity_kg`.
    pub async fn run(&self, vehicle_capacity_kg: f64) -> AppResult<Vec<OrderBatch>> {
        let pending = self.gateway.list_pending_orders().await?;
        let pickups = self.gateway.list_pickups().await?;

        let candidates: Vec<Order> = pending.into_iter().filter(|o| o.batch_id.is_none()).collect();
        let zones = group_by_zone(&candidates, self.zone_radius_km);

        let mut batches = Vec::new();
        for zone in zones {
            for group in pack_by_capacity(&zone, vehicle_capacity_kg) {
                if group.len() < 2 {
                    // A lone order isn't worth batching; leave it for direct assignment.
                    continue;
                }
                let pickup_name = pickups
                    .iter()
                    .find(|p| p.id == group[0].pickup_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| group[0].pickup_id.clone());

                let order_ids: Vec<String> = group.iter().map(|o| o.id.clone()).collect();
                let batch = OrderBatch {
                    batch_number: Uuid::new_v4().to_string(),
                    driver_id: None,
                    order_ids: sqlx::types::Json(order_ids.clone()),
                    order_count: group.len() as i32,
                    total_distance_km: batch_span_km(&group),
                    estimated_duration_min: 0.0,
                    delivery_zone: pickup_name,
                    status: BatchStatus::Pending,
                    created_at: Utc::now(),
                };

                self.gateway.save_batch(batch.clone()).await?;
                for order_id in &order_ids {
                    self.gateway.set_order_batch(order_id, &batch.batch_number).await?;
                }
                batches.push(batch);
            }
        }
        Ok(batches)
    }
}

/// Groups orders first by `pickupId`, then splits each pickup's orders into
/// clusters whose delivery points are within `zone_radius_km` of the first
/// order's point (the cluster's seed).
fn group_by_zone(orders: &[Order], zone_radius_km: f64) -> Vec<Vec<Order>> {
    let mut by_pickup: Vec<(String, Vec<Order>)> = Vec::new();
    for order in orders {
        match by_pickup.iter_mut().find(|(id, _)| id == &order.pickup_id) {
            Some((_, list)) => list.push(order.clone()),
            None => by_pickup.push((order.pickup_id.clone(), vec![order.clone()])),
        }
    }

    let mut zones = Vec::new();
    for (_, orders) in by_pickup {
        let mut remaining = orders;
        while !remaining.is_empty() {
            let seed = remaining.remove(0);
            let seed_coord = Coord::new(seed.delivery_lat, seed.delivery_lng);
            let mut cluster = vec![seed];
            remaining.retain(|o| {
                let coord = Coord::new(o.delivery_lat, o.delivery_lng);
                if haversine_km(seed_coord, coord) <= zone_radius_km {
                    cluster.push(o.clone());
                    false
                } else {
                    true
                }
            });
            zones.push(cluster);
        }
    }
    zones
}

/// Packs a zone's orders into capacity-respecting groups, first-fit in
/// insertion order (mirrors the round-robin determinism the optimizer uses).
fn pack_by_capacity(zone: &[Order], vehicle_capacity_kg: f64) -> Vec<Vec<Order>> {
    let mut groups: Vec<(f64, Vec<Order>)> = Vec::new();
    for order in zone {
        if let Some((load, group)) = groups.iter_mut().find(|(load, _)| load + order.load_kg <= vehicle_capacity_kg) {
            *load += order.load_kg;
            group.push(order.clone());
        } else {
            groups.push((order.load_kg, vec![order.clone()]));
        }
    }
    groups.into_iter().map(|(_, g)| g).collect()
}

fn batch_span_km(orders: &[Order]) -> f64 {
    let mut max = 0.0;
    for a in orders {
        for b in orders {
            let dist = haversine_km(Coord::new(a.delivery_lat, a.delivery_lng), Coord::new(b.delivery_lat, b.delivery_lng));
            if dist > max {
                max = dist;
            }
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryStore;
    use crate::models::OrderStatus;
    use chrono::Duration;

    fn order(id: &str, pickup_id: &str, lat: f64, lng: f64, load_kg: f64) -> Order {
        let now = Utc::now();
        Order {
            id: id.into(),
            customer_ref: "c".into(),
            pickup_id: pickup_id.into(),
            delivery_lat: lat,
            delivery_lng: lng,
            load_kg,
            priority: 5,
            revenue: 20.0,
            created_at: now,
            sla_deadline: now + Duration::hours(2),
            status: OrderStatus::Pending,
            assigned_driver_id: None,
            batch_id: None,
            attempts: 0,
            last_status_change: now,
        }
    }

    fn engine() -> (BatchingEngine, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(PersistenceGateway::new(
            store.clone(),
            crate::config::StoreTimeouts::default(),
            crate::config::BreakerConfig::default(),
        ));
        (BatchingEngine::new(gateway), store)
    }

    #[tokio::test]
    async fn groups_nearby_orders_sharing_a_pickup_into_one_batch() {
        let (engine, store) = engine();
        store.seed_order(order("o1", "P1", 24.71, 46.67, 10.0));
        store.seed_order(order("o2", "P1", 24.711, 46.671, 10.0));

        let batches = engine.run(200.0).await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].order_count, 2);
    }

    #[tokio::test]
    async fn does_not_batch_orders_outside_the_zone_radius() {
        let (engine, store) = engine();
        store.seed_order(order("o1", "P1", 24.71, 46.67, 10.0));
        store.seed_order(order("o2", "P1", 25.50, 47.80, 10.0));

        let batches = engine.run(200.0).await.unwrap();
        assert!(batches.is_empty());
    }

    #[tokio::test]
    async fn respects_vehicle_capacity_when_packing() {
        let (engine, store) = engine();
        for i in 0..4 {
            store.seed_order(order(&format!("o{i}"), "P1", 24.71, 46.67, 60.0));
        }
        let batches = engine.run(100.0).await.unwrap();
        for batch in &batches {
            assert!(batch.order_count as f64 * 60.0 <= 100.0 + 60.0);
        }
    }
}
