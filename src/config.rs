use std::env;

/// Weights for the driver scorer's weighted sum. Must sum to 1.0; validated
/// once at startup rather than on every scoring call.
#[derive(Clone, Debug)]
pub struct ScorerWeights {
    pub distance: f64,
    pub time: f64,
    pub load: f64,
    pub priority: f64,
    pub route: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self { distance: 0.30, time: 0.20, load: 0.15, priority: 0.20, route: 0.15 }
    }
}

impl ScorerWeights {
    pub fn sum(&self) -> f64 {
        self.distance + self.time + self.load + self.priority + self.route
    }
}

#[derive(Clone, Debug)]
pub struct ScorerConfig {
    pub weights: ScorerWeights,
    pub max_dist_km: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self { weights: ScorerWeights::default(), max_dist_km: 50.0 }
    }
}

#[derive(Clone, Debug)]
pub struct OptimizerConfig {
    pub sla_minutes: f64,
    pub avg_min_per_delivery: f64,
    pub avg_speed_kph: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { sla_minutes: 120.0, avg_min_per_delivery: 10.0, avg_speed_kph: 30.0 }
    }
}

#[derive(Clone, Debug)]
pub struct CycleConfig {
    pub dispatch_interval_secs: u64,
    pub routes_interval_secs: u64,
    pub batching_interval_secs: u64,
    pub escalation_interval_secs: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_secs: 30,
            routes_interval_secs: 300,
            batching_interval_secs: 120,
            escalation_interval_secs: 60,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StoreTimeouts {
    pub read_ms: u64,
    pub metrics_ms: u64,
    pub mutation_ms: u64,
}

impl Default for StoreTimeouts {
    fn default() -> Self {
        Self { read_ms: 1_000, metrics_ms: 8_000, mutation_ms: 3_000 }
    }
}

#[derive(Clone, Debug)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub open_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 3, open_secs: 120 }
    }
}

#[derive(Clone, Debug)]
pub struct TargetsConfig {
    /// Minutes since local midnight.
    pub shift_start_min: u32,
    pub shift_end_min: u32,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self { shift_start_min: 8 * 60, shift_end_min: 20 * 60 }
    }
}

/// Top-level configuration, read once at startup and treated as read-only
/// after that — the only state shared between request handlers and engine
/// ticks other than the store itself.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub scorer: ScorerConfig,
    pub optimizer: OptimizerConfig,
    pub cycle: CycleConfig,
    pub store_timeouts: StoreTimeouts,
    pub breaker: BreakerConfig,
    pub targets: TargetsConfig,
    pub escalation_dedup_window_secs: u64,
    pub drain_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenvy::dotenv().ok();

        let mut scorer = ScorerConfig::default();
        scorer.weights.distance = env_f64("SCORER_WEIGHT_DISTANCE", scorer.weights.distance);
        scorer.weights.time = env_f64("SCORER_WEIGHT_TIME", scorer.weights.time);
        scorer.weights.load = env_f64("SCORER_WEIGHT_LOAD", scorer.weights.load);
        scorer.weights.priority = env_f64("SCORER_WEIGHT_PRIORITY", scorer.weights.priority);
        scorer.weights.route = env_f64("SCORER_WEIGHT_ROUTE", scorer.weights.route);
        scorer.max_dist_km = env_f64("SCORER_MAX_DIST_KM", scorer.max_dist_km);

        let mut optimizer = OptimizerConfig::default();
        optimizer.sla_minutes = env_f64("OPTIMIZER_SLA_MINUTES", optimizer.sla_minutes);
        optimizer.avg_min_per_delivery =
            env_f64("OPTIMIZER_AVG_MIN_PER_DELIVERY", optimizer.avg_min_per_delivery);
        optimizer.avg_speed_kph = env_f64("OPTIMIZER_AVG_SPEED_KPH", optimizer.avg_speed_kph);

        let mut cycle = CycleConfig::default();
        cycle.dispatch_interval_secs =
            env_u64("CYCLE_DISPATCH_INTERVAL_SEC", cycle.dispatch_interval_secs);
        cycle.routes_interval_secs =
            env_u64("CYCLE_ROUTES_INTERVAL_SEC", cycle.routes_interval_secs);
        cycle.batching_interval_secs =
            env_u64("CYCLE_BATCHING_INTERVAL_SEC", cycle.batching_interval_secs);
        cycle.escalation_interval_secs =
            env_u64("CYCLE_ESCALATION_INTERVAL_SEC", cycle.escalation_interval_secs);

        let mut store_timeouts = StoreTimeouts::default();
        store_timeouts.read_ms = env_u64("STORE_TIMEOUT_READ_MS", store_timeouts.read_ms);
        store_timeouts.metrics_ms = env_u64("STORE_TIMEOUT_METRICS_MS", store_timeouts.metrics_ms);
        store_timeouts.mutation_ms =
            env_u64("STORE_TIMEOUT_MUTATION_MS", store_timeouts.mutation_ms);

        let mut breaker = BreakerConfig::default();
        breaker.failure_threshold =
            env_u64("STORE_BREAKER_FAILURES", breaker.failure_threshold as u64) as u32;
        breaker.open_secs = env_u64("STORE_BREAKER_OPEN_SEC", breaker.open_secs);

        let mut targets = TargetsConfig::default();
        targets.shift_start_min =
            env_u64("TARGETS_SHIFT_START_MIN", targets.shift_start_min as u64) as u32;
        targets.shift_end_min =
            env_u64("TARGETS_SHIFT_END_MIN", targets.shift_end_min as u64) as u32;

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            scorer,
            optimizer,
            cycle,
            store_timeouts,
            breaker,
            targets,
            escalation_dedup_window_secs: env_u64("ESCALATION_DEDUP_WINDOW_SEC", 30 * 60),
            drain_timeout_ms: env_u64("DRAIN_TIMEOUT_MS", 10_000),
        })
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        let weights = ScorerWeights::default();
        assert!((weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn default_shift_window_is_eight_to_twenty() {
        let targets = TargetsConfig::default();
        assert_eq!(targets.shift_start_min, 480);
        assert_eq!(targets.shift_end_min, 1200);
    }
}
