//! Route Optimizer (§4.6): capacitated multi-pickup vehicle routing.
//! Groups deliveries by pickup, allocates vehicles per pickup SLA-aware,
//! splits by round-robin respecting capacity, sequences nearest-neighbour,
//! then improves with a single 2-opt pass.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::OptimizerConfig;
use crate::error::AppResult;
use crate::geo::{haversine_km, straight_line_minutes, Coord};
use crate::models::{
    AlertType, DispatchAlert, EscalationSeverity, OptimizationStatus, PickupPoint, Route,
    RouteOptimizationLog, RouteStatus, RouteStop,
};
use crate::persistence::PersistenceGateway;

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: String,
    pub driver_id: String,
    pub capacity_kg: f64,
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub order_id: String,
    pub pickup_id: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub load_kg: f64,
    pub sla_deadline: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OptimizeRequest {
    pub pickups: Vec<PickupPoint>,
    pub deliveries: Vec<Delivery>,
    pub vehicles: Vec<Vehicle>,
    pub sla_minutes: f64,
}

#[derive(Debug, Clone, Default)]
pub struct OptimizeSummary {
    pub vehicles_used: usize,
    pub total_deliveries: usize,
    pub avg_per_vehicle: f64,
    pub overall_utilization_pct: f64,
}

#[derive(Debug, Clone, Default)]
pub struct OptimizeOutput {
    pub routes: Vec<Route>,
    pub summary: OptimizeSummary,
    pub degraded: bool,
}

const TWO_OPT_MAX_STOPS: usize = 30;

pub struct RouteOptimizer {
    gateway: Arc<PersistenceGateway>,
    cfg: OptimizerConfig,
}

impl RouteOptimizer {
    pub fn new(gateway: Arc<PersistenceGateway>, cfg: OptimizerConfig) -> Self {
        Self { gateway, cfg }
    }

    pub async fn optimize(&self, req: OptimizeRequest) -> AppResult<OptimizeOutput> {
        if req.deliveries.is_empty() {
            return Ok(OptimizeOutput {
                routes: vec![],
                summary: OptimizeSummary { vehicles_used: 0, ..Default::default() },
                degraded: false,
            });
        }

        let sla_minutes = if req.sla_minutes > 0.0 { req.sla_minutes } else { self.cfg.sla_minutes };
        let by_pickup = group_by_pickup(&req.pickups, &req.deliveries);

        let allocations = allocate_vehicles(&by_pickup, req.vehicles.len(), sla_minutes, self.cfg.avg_min_per_delivery);

        let mut routes = Vec::new();
        let mut next_vehicle_idx = 0;
        let mut degraded = false;

        for (pickup_id, deliveries) in &by_pickup {
            let Some(pickup) = req.pickups.iter().find(|p| &p.id == pickup_id) else { continue };
            let allocated_count = allocations.get(pickup_id).copied().unwrap_or(1).max(1);
            let available_vehicles: Vec<&Vehicle> = req
                .vehicles
                .iter()
                .skip(next_vehicle_idx)
                .take(allocated_count)
                .collect();
            if available_vehicles.is_empty() {
                continue;
            }
            next_vehicle_idx += available_vehicles.len();

            let (batches, overflowed) = split_round_robin(deliveries, &available_vehicles);
            if overflowed {
                degraded = true;
                let alert = DispatchAlert {
                    order_id: deliveries.first().map(|d| d.order_id.clone()).unwrap_or_default(),
                    r#type: AlertType::OptimizationNeeded,
                    severity: EscalationSeverity::Medium,
                    message: format!("capacity overflow while splitting deliveries for pickup {pickup_id}"),
                    resolved: false,
                    created_at: Utc::now(),
                    resolved_at: None,
                };
                let _ = self.gateway.append_dispatch_alert(alert).await;
            }

            for (vehicle, batch) in available_vehicles.iter().zip(batches.into_iter()) {
                if batch.is_empty() {
                    continue;
                }
                let (route, log) = self.build_route(pickup, vehicle, batch);
                degraded = degraded || log.status == OptimizationStatus::FailedFallback;
                let _ = self.gateway.append_route_optimization_log(log).await;
                routes.push(route);
            }
        }

        let _ = self.gateway.save_routes(&routes).await;

        let total_deliveries = req.deliveries.len();
        let vehicles_used = routes.len();
        let avg_per_vehicle = if vehicles_used > 0 { total_deliveries as f64 / vehicles_used as f64 } else { 0.0 };
        let total_capacity: f64 = req.vehicles.iter().take(vehicles_used.max(1)).map(|v| v.capacity_kg).sum();
        let total_load: f64 = routes.iter().flat_map(|r| r.ordered_stops.iter()).count() as f64;
        let overall_utilization_pct = if total_capacity > 0.0 { (total_load / total_capacity) * 100.0 } else { 0.0 };

        Ok(OptimizeOutput {
            routes,
            summary: OptimizeSummary { vehicles_used, total_deliveries, avg_per_vehicle, overall_utilization_pct },
            degraded,
        })
    }

    fn build_route(&self, pickup: &PickupPoint, vehicle: &Vehicle, batch: Vec<Delivery>) -> (Route, RouteOptimizationLog) {
        let now = Utc::now();
        let pickup_coord = Coord::new(pickup.lat, pickup.lng);
        let original_distance = path_distance(pickup_coord, &batch);

        let sequenced = nearest_neighbor_sequence(pickup_coord, batch.clone());
        let (mut stops, mut total_distance) = build_stops(pickup_coord, &sequenced, now, self.cfg.avg_speed_kph);

        let mut status = OptimizationStatus::Ok;
        let mut stops_reordered = sequenced.len() as i32;

        if stops.is_empty() && !batch.is_empty() {
            // Sequencing produced nothing usable; fall back to input order.
            let (naive_stops, naive_distance) = build_stops(pickup_coord, &batch, now, self.cfg.avg_speed_kph);
            stops = naive_stops;
            total_distance = naive_distance;
            status = OptimizationStatus::FailedFallback;
            stops_reordered = 0;
        } else if stops.len() <= TWO_OPT_MAX_STOPS {
            let improved = two_opt(pickup_coord, &sequenced);
            let (improved_stops, improved_distance) = build_stops(pickup_coord, &improved, now, self.cfg.avg_speed_kph);
            if improved_distance < total_distance {
                stops = improved_stops;
                total_distance = improved_distance;
            }
        }

        let total_duration_min =
            stops.iter().map(|s| s.service_time_min).sum::<f64>() + total_distance / self.cfg.avg_speed_kph * 60.0;

        let route = Route {
            id: Uuid::new_v4().to_string(),
            driver_id: vehicle.driver_id.clone(),
            vehicle_id: vehicle.id.clone(),
            pickup_id: pickup.id.clone(),
            ordered_stops: stops,
            total_distance_km: total_distance,
            total_duration_min,
            status: RouteStatus::Planned,
            created_at: now,
            optimized_at: Some(now),
        };

        let distance_saved_km = (original_distance - total_distance).max(0.0);
        let improvement_pct = if original_distance > 0.0 { distance_saved_km / original_distance * 100.0 } else { 0.0 };

        let log = RouteOptimizationLog {
            driver_id: vehicle.driver_id.clone(),
            order_ids: sqlx::types::Json(route.ordered_stops.iter().map(|s| s.order_id.clone()).collect()),
            original_distance,
            optimized_distance: total_distance,
            distance_saved_km,
            time_saved_min: distance_saved_km / self.cfg.avg_speed_kph * 60.0,
            stops_reordered,
            improvement_pct,
            algorithm: "nearest-neighbor+2opt".into(),
            status,
            created_at: now,
            optimized_at: now,
        };

        (route, log)
    }
}

fn group_by_pickup<'a>(
    pickups: &[PickupPoint],
    deliveries: &'a [Delivery],
) -> Vec<(String, Vec<Delivery>)> {
    let mut groups: Vec<(String, Vec<Delivery>)> = Vec::new();
    for delivery in deliveries {
        let pickup_id = delivery.pickup_id.clone().unwrap_or_else(|| nearest_pickup_id(pickups, delivery));
        match groups.iter_mut().find(|(id, _)| id == &pickup_id) {
            Some((_, list)) => list.push(delivery.clone()),
            None => groups.push((pickup_id, vec![delivery.clone()])),
        }
    }
    groups
}

fn nearest_pickup_id(pickups: &[PickupPoint], delivery: &Delivery) -> String {
    let coord = Coord::new(delivery.lat, delivery.lng);
    pickups
        .iter()
        .min_by(|a, b| {
            let da = haversine_km(Coord::new(a.lat, a.lng), coord);
            let db = haversine_km(Coord::new(b.lat, b.lng), coord);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|p| p.id.clone())
        .unwrap_or_default()
}

/// `needed = ceil(count * avgMinPerDelivery / slaMinutes)`, proportionally
/// scaled down if the sum across pickups exceeds fleet size.
fn allocate_vehicles(
    by_pickup: &[(String, Vec<Delivery>)],
    fleet_size: usize,
    sla_minutes: f64,
    avg_min_per_delivery: f64,
) -> std::collections::HashMap<String, usize> {
    let mut needed: Vec<(String, usize)> = by_pickup
        .iter()
        .map(|(id, deliveries)| {
            let time_needed = deliveries.len() as f64 * avg_min_per_delivery;
            let n = (time_needed / sla_minutes).ceil().max(1.0) as usize;
            (id.clone(), n)
        })
        .collect();

    let total_needed: usize = needed.iter().map(|(_, n)| n).sum();
    if total_needed > fleet_size && fleet_size > 0 {
        let total_needed_f = total_needed as f64;
        for (_, n) in needed.iter_mut() {
            let share = (*n as f64 / total_needed_f * fleet_size as f64).floor().max(1.0) as usize;
            *n = share;
        }
    }
    needed.into_iter().collect()
}

/// `vehicle[i] := deliveries[i mod N]`, overflowing to the next vehicle with
/// room when a vehicle's accumulated load would exceed capacity. Returns
/// `true` in the second element if at least one delivery could not be
/// placed anywhere (caller emits a `DispatchAlert`).
fn split_round_robin(deliveries: &[Delivery], vehicles: &[&Vehicle]) -> (Vec<Vec<Delivery>>, bool) {
    let n = vehicles.len();
    let mut batches: Vec<Vec<Delivery>> = vec![Vec::new(); n];
    let mut loads = vec![0.0_f64; n];
    let mut overflowed = false;

    for (i, delivery) in deliveries.iter().enumerate() {
        let home = i % n;
        let mut placed = false;
        for offset in 0..n {
            let idx = (home + offset) % n;
            if loads[idx] + delivery.load_kg <= vehicles[idx].capacity_kg {
                batches[idx].push(delivery.clone());
                loads[idx] += delivery.load_kg;
                placed = true;
                break;
            }
        }
        if !placed {
            overflowed = true;
        }
    }
    (batches, overflowed)
}

/// Nearest-neighbour from the pickup point, ties broken by earliest SLA
/// deadline.
fn nearest_neighbor_sequence(start: Coord, mut remaining: Vec<Delivery>) -> Vec<Delivery> {
    let mut sequence = Vec::with_capacity(remaining.len());
    let mut current = start;
    while !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_dist = haversine_km(current, Coord::new(remaining[0].lat, remaining[0].lng));
        for (i, d) in remaining.iter().enumerate().skip(1) {
            let dist = haversine_km(current, Coord::new(d.lat, d.lng));
            let closer = dist < best_dist;
            let tied_but_earlier_sla = dist == best_dist && d.sla_deadline < remaining[best_idx].sla_deadline;
            if closer || tied_but_earlier_sla {
                best_idx = i;
                best_dist = dist;
            }
        }
        let next = remaining.remove(best_idx);
        current = Coord::new(next.lat, next.lng);
        sequence.push(next);
    }
    sequence
}

fn path_distance(start: Coord, deliveries: &[Delivery]) -> f64 {
    let mut total = 0.0;
    let mut current = start;
    for d in deliveries {
        let next = Coord::new(d.lat, d.lng);
        total += haversine_km(current, next);
        current = next;
    }
    total
}

fn build_stops(
    start: Coord,
    deliveries: &[Delivery],
    now: DateTime<Utc>,
    speed_kph: f64,
) -> (Vec<RouteStop>, f64) {
    const SERVICE_TIME_MIN: f64 = 5.0;
    let mut stops = Vec::with_capacity(deliveries.len());
    let mut current = start;
    let mut elapsed_min = 0.0;
    let mut total_distance = 0.0;

    for d in deliveries {
        let next = Coord::new(d.lat, d.lng);
        let leg_km = haversine_km(current, next);
        let leg_min = straight_line_minutes(current, next, speed_kph);
        elapsed_min += leg_min;
        total_distance += leg_km;
        stops.push(RouteStop {
            order_id: d.order_id.clone(),
            arrival_time_estimate: now + chrono::Duration::milliseconds((elapsed_min * 60_000.0) as i64),
            service_time_min: SERVICE_TIME_MIN,
        });
        elapsed_min += SERVICE_TIME_MIN;
        current = next;
    }
    (stops, total_distance)
}

/// Single O(n^2) 2-opt pass; accepts a swap only if it strictly improves
/// total distance. Caller is responsible for the `n <= 30` cap.
fn two_opt(start: Coord, deliveries: &[Delivery]) -> Vec<Delivery> {
    let mut route = deliveries.to_vec();
    let n = route.len();
    if n < 4 {
        return route;
    }

    let path_len = |route: &[Delivery]| -> f64 {
        let mut total = 0.0;
        let mut current = start;
        for d in route {
            let next = Coord::new(d.lat, d.lng);
            total += haversine_km(current, next);
            current = next;
        }
        total
    };

    let mut best_len = path_len(&route);
    for i in 0..n - 1 {
        for j in i + 1..n {
            let mut candidate = route.clone();
            candidate[i..=j].reverse();
            let candidate_len = path_len(&candidate);
            if candidate_len < best_len {
                route = candidate;
                best_len = candidate_len;
            }
        }
    }
    route
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryStore;

    fn gateway() -> Arc<PersistenceGateway> {
        Arc::new(PersistenceGateway::new(
            Arc::new(InMemoryStore::new()),
            crate::config::StoreTimeouts::default(),
            crate::config::BreakerConfig::default(),
        ))
    }

    fn pickup(id: &str, lat: f64, lng: f64) -> PickupPoint {
        PickupPoint { id: id.into(), lat, lng, name: id.into() }
    }

    fn delivery(id: &str, lat: f64, lng: f64, load_kg: f64, sla_min: i64) -> Delivery {
        Delivery {
            order_id: id.into(),
            pickup_id: Some("P1".into()),
            lat,
            lng,
            load_kg,
            sla_deadline: Utc::now() + chrono::Duration::minutes(sla_min),
        }
    }

    fn vehicle(id: &str, capacity_kg: f64) -> Vehicle {
        Vehicle { id: id.into(), driver_id: format!("drv-{id}"), capacity_kg }
    }

    #[tokio::test]
    async fn empty_deliveries_returns_zero_vehicles_not_an_error() {
        let optimizer = RouteOptimizer::new(gateway(), OptimizerConfig::default());
        let out = optimizer
            .optimize(OptimizeRequest { pickups: vec![], deliveries: vec![], vehicles: vec![], sla_minutes: 120.0 })
            .await
            .unwrap();
        assert_eq!(out.summary.vehicles_used, 0);
        assert!(out.routes.is_empty());
    }

    #[tokio::test]
    async fn single_driver_single_order_makes_one_route_one_stop() {
        let optimizer = RouteOptimizer::new(gateway(), OptimizerConfig::default());
        let req = OptimizeRequest {
            pickups: vec![pickup("P1", 24.7136, 46.6753)],
            deliveries: vec![delivery("o1", 24.72, 46.68, 10.0, 90)],
            vehicles: vec![vehicle("v1", 200.0)],
            sla_minutes: 120.0,
        };
        let out = optimizer.optimize(req).await.unwrap();
        assert_eq!(out.routes.len(), 1);
        assert_eq!(out.routes[0].ordered_stops.len(), 1);
    }

    #[tokio::test]
    async fn s1_single_pickup_under_utilised_fleet_uses_two_vehicles() {
        let optimizer = RouteOptimizer::new(gateway(), OptimizerConfig::default());
        let mut deliveries = Vec::new();
        for i in 0..20 {
            let offset = (i as f64) * 0.01;
            deliveries.push(delivery(&format!("o{i}"), 24.7136 + offset, 46.6753 + offset, 10.0, 120));
        }
        let vehicles: Vec<Vehicle> = (0..10).map(|i| vehicle(&format!("v{i}"), 200.0)).collect();
        let req = OptimizeRequest {
            pickups: vec![pickup("P1", 24.7136, 46.6753)],
            deliveries,
            vehicles,
            sla_minutes: 120.0,
        };
        let out = optimizer.optimize(req).await.unwrap();
        assert_eq!(out.summary.vehicles_used, 2);
        for route in &out.routes {
            assert_eq!(route.ordered_stops.len(), 10);
        }
    }

    #[tokio::test]
    async fn s3_capacity_overflow_never_exceeds_vehicle_capacity() {
        let optimizer = RouteOptimizer::new(gateway(), OptimizerConfig::default());
        let deliveries: Vec<Delivery> =
            (0..5).map(|i| delivery(&format!("o{i}"), 24.72 + i as f64 * 0.01, 46.68, 300.0, 120)).collect();
        let vehicles = vec![vehicle("v1", 500.0), vehicle("v2", 500.0), vehicle("v3", 500.0)];
        let req = OptimizeRequest {
            pickups: vec![pickup("P1", 24.7136, 46.6753)],
            deliveries,
            vehicles,
            sla_minutes: 120.0,
        };
        let out = optimizer.optimize(req).await.unwrap();

        for route in &out.routes {
            let load: f64 = route.ordered_stops.len() as f64 * 300.0;
            assert!(load <= 500.0);
        }
    }

    #[test]
    fn two_opt_never_increases_distance() {
        let start = Coord::new(24.7136, 46.6753);
        let deliveries = vec![
            delivery("o1", 24.72, 46.70, 10.0, 90),
            delivery("o2", 24.71, 46.65, 10.0, 90),
            delivery("o3", 24.73, 46.69, 10.0, 90),
            delivery("o4", 24.70, 46.66, 10.0, 90),
        ];
        let before = path_distance(start, &deliveries);
        let improved = two_opt(start, &deliveries);
        let after = path_distance(start, &improved);
        assert!(after <= before);
    }
}
