//! Driver scorer (§4.4). Produces a total score in `[0, 100]` for a
//! `(driver, order)` pair, where lower is better. Pure given its inputs —
//! callers pass in whatever store-derived state the score needs rather than
//! the scorer reaching into the store itself.

use crate::config::ScorerConfig;
use crate::geo::{haversine_km, Coord};
use crate::models::driver::Driver;

#[derive(Debug, Clone, Copy)]
pub struct ScoreBreakdown {
    pub distance: f64,
    pub time: f64,
    pub load: f64,
    pub priority: f64,
    pub route_affinity: f64,
    pub total: f64,
}

/// Inputs the scorer needs about the order and the driver's current
/// progress that don't live on the `Driver`/`Order` structs themselves.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext {
    pub pickup: Coord,
    pub order_load_kg: f64,
    pub order_priority: i32,
    /// Combined delivery+revenue progress in `[0, 1]`, from the target tracker.
    pub driver_progress: f64,
    pub order_pickup_id_matches_driver_route: bool,
    pub driver_has_active_route: bool,
}

fn distance_score(driver: Coord, pickup: Coord, max_dist_km: f64) -> f64 {
    if max_dist_km <= 0.0 {
        return 100.0;
    }
    let km = haversine_km(driver, pickup);
    (km / max_dist_km * 100.0).min(100.0)
}

fn time_score(driver_progress: f64) -> f64 {
    let progress = driver_progress.clamp(0.0, 1.0);
    100.0 * (1.0 - progress)
}

fn load_score(utilization_pct: f64) -> f64 {
    if utilization_pct > 100.0 {
        100.0
    } else if utilization_pct > 90.0 {
        10.0
    } else if utilization_pct > 70.0 {
        30.0
    } else {
        70.0 - utilization_pct
    }
}

fn priority_score(order_priority: i32) -> f64 {
    100.0 - (order_priority as f64) * 10.0
}

/// "same pickup anywhere in the route -> 0, else 100" resolves the open
/// question on partial-route affinity (see DESIGN.md).
fn route_affinity_score(same_pickup: bool, has_active_route: bool) -> f64 {
    if same_pickup {
        0.0
    } else if !has_active_route {
        50.0
    } else {
        100.0
    }
}

/// Hard gates that must pass before a driver is scored at all.
pub fn passes_hard_gates(driver: &Driver, order_load_kg: f64, max_dist_km: Option<f64>, pickup: Coord) -> bool {
    use crate::models::driver::DriverStatus;
    if driver.status != DriverStatus::Available {
        return false;
    }
    if driver.current_load_kg + order_load_kg > driver.capacity_kg {
        return false;
    }
    if let Some(max_km) = max_dist_km {
        let driver_coord = Coord::new(driver.current_lat, driver.current_lng);
        if haversine_km(driver_coord, pickup) > max_km {
            return false;
        }
    }
    true
}

pub fn score(driver: &Driver, ctx: &ScoringContext, cfg: &ScorerConfig) -> ScoreBreakdown {
    let driver_coord = Coord::new(driver.current_lat, driver.current_lng);

    let distance = distance_score(driver_coord, ctx.pickup, cfg.max_dist_km);
    let time = time_score(ctx.driver_progress);
    let load = load_score(driver.utilization_pct(ctx.order_load_kg));
    let priority = priority_score(ctx.order_priority);
    let route_affinity =
        route_affinity_score(ctx.order_pickup_id_matches_driver_route, ctx.driver_has_active_route);

    let w = &cfg.weights;
    let total = w.distance * distance
        + w.time * time
        + w.load * load
        + w.priority * priority
        + w.route * route_affinity;

    ScoreBreakdown { distance, time, load, priority, route_affinity, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::driver::DriverStatus;

    fn make_driver(load: f64, capacity: f64) -> Driver {
        Driver {
            id: "d1".into(),
            name: "Driver One".into(),
            vehicle_type: "van".into(),
            capacity_kg: capacity,
            current_lat: 24.7136,
            current_lng: 46.6753,
            status: DriverStatus::Available,
            last_heartbeat_at: chrono::Utc::now(),
            current_load_kg: load,
            current_deliveries: 0,
            current_pickup_id: None,
        }
    }

    #[test]
    fn load_score_rewards_the_seventy_to_ninety_band() {
        assert!(load_score(80.0) < load_score(50.0));
        assert!(load_score(80.0) < load_score(95.0));
        assert_eq!(load_score(101.0), 100.0);
    }

    #[test]
    fn distance_score_caps_at_100() {
        let far = Coord::new(0.0, 0.0);
        let near = Coord::new(0.01, 0.01);
        assert_eq!(distance_score(far, near, 50.0).min(100.0), distance_score(far, near, 50.0));
        assert!(distance_score(far, near, 50.0) <= 100.0);
    }

    #[test]
    fn hard_gate_rejects_busy_driver() {
        let mut driver = make_driver(0.0, 200.0);
        driver.status = DriverStatus::Busy;
        let pickup = Coord::new(24.7136, 46.6753);
        assert!(!passes_hard_gates(&driver, 10.0, Some(50.0), pickup));
    }

    #[test]
    fn hard_gate_rejects_over_capacity() {
        let driver = make_driver(195.0, 200.0);
        let pickup = Coord::new(24.7136, 46.6753);
        assert!(!passes_hard_gates(&driver, 10.0, Some(50.0), pickup));
    }

    #[test]
    fn lower_total_score_is_better_for_needy_idle_driver() {
        let cfg = ScorerConfig::default();
        let driver = make_driver(0.0, 200.0);
        let pickup = Coord::new(24.7136, 46.6753);

        let needy = ScoringContext {
            pickup,
            order_load_kg: 10.0,
            order_priority: 1,
            driver_progress: 0.0,
            order_pickup_id_matches_driver_route: true,
            driver_has_active_route: false,
        };
        let saturated = ScoringContext { driver_progress: 0.9, ..needy };

        let needy_score = score(&driver, &needy, &cfg);
        let saturated_score = score(&driver, &saturated, &cfg);
        assert!(needy_score.total < saturated_score.total);
    }
}
