//! Pure geo/distance primitives. No I/O, no store access — every function
//! here is a function of its inputs alone, per §4.1.

const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEFAULT_SPEED_KPH: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lat: f64,
    pub lng: f64,
}

impl Coord {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Great-circle distance between two coordinates, in kilometres.
/// Commutative, non-negative, and zero iff the two points are identical.
pub fn haversine_km(a: Coord, b: Coord) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Straight-line ETA between two coordinates at a constant speed.
pub fn straight_line_minutes(a: Coord, b: Coord, speed_kph: f64) -> f64 {
    if speed_kph <= 0.0 {
        return f64::INFINITY;
    }
    let km = haversine_km(a, b);
    (km / speed_kph) * 60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_identical_points() {
        let p = Coord::new(24.7136, 46.6753);
        assert_eq!(haversine_km(p, p), 0.0);
    }

    #[test]
    fn distance_is_commutative() {
        let a = Coord::new(24.7136, 46.6753);
        let b = Coord::new(24.6877, 46.7219);
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
    }

    #[test]
    fn distance_is_never_negative() {
        let a = Coord::new(-33.8688, 151.2093);
        let b = Coord::new(51.5074, -0.1278);
        assert!(haversine_km(a, b) >= 0.0);
    }

    #[test]
    fn riyadh_known_short_hop_is_plausible() {
        // Two points ~5km apart within Riyadh.
        let a = Coord::new(24.7136, 46.6753);
        let b = Coord::new(24.6877, 46.7219);
        let d = haversine_km(a, b);
        assert!(d > 3.0 && d < 8.0, "expected ~5km, got {d}");
    }

    #[test]
    fn eta_scales_inversely_with_speed() {
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(0.5, 0.0);
        let fast = straight_line_minutes(a, b, 60.0);
        let slow = straight_line_minutes(a, b, 30.0);
        assert!((slow - fast * 2.0).abs() < 1e-6);
    }
}
