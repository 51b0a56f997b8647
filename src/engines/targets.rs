//! Target Tracker (§4.3): per-driver daily delivery/revenue goals and
//! on-track status against a linear expected-progress curve.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Timelike, Utc};

use crate::config::TargetsConfig;
use crate::error::AppResult;
use crate::models::{PerformanceSnapshot, TargetStatus};
use crate::persistence::PersistenceGateway;

pub struct TargetTracker {
    gateway: Arc<PersistenceGateway>,
    cfg: TargetsConfig,
}

impl TargetTracker {
    pub fn new(gateway: Arc<PersistenceGateway>, cfg: TargetsConfig) -> Self {
        Self { gateway, cfg }
    }

    pub async fn set_targets(&self, drivers: &[(String, i64, f64)]) -> AppResult<usize> {
        self.gateway.upsert_targets(drivers).await
    }

    pub async fn increment_progress(&self, driver_id: &str, deliveries: i64, revenue: f64) -> AppResult<()> {
        self.gateway.increment_progress(driver_id, deliveries, revenue).await
    }

    pub async fn get_status(&self, driver_id: &str, now: DateTime<Utc>) -> AppResult<Option<TargetStatus>> {
        let target = self.gateway.get_target(driver_id).await?;
        Ok(target.map(|t| {
            let delivery_progress = t.delivery_progress();
            let revenue_progress = t.revenue_progress();
            let expected = expected_progress(now, &self.cfg);
            let on_track = delivery_progress >= expected && revenue_progress >= expected;
            TargetStatus { target: t, delivery_progress, revenue_progress, on_track }
        }))
    }

    /// Sorted neediest-first (ascending delivery progress), per spec.
    pub async fn get_all_status(&self, now: DateTime<Utc>) -> AppResult<Vec<TargetStatus>> {
        let targets = self.gateway.list_targets().await?;
        let expected = expected_progress(now, &self.cfg);
        let mut statuses: Vec<TargetStatus> = targets
            .into_iter()
            .map(|t| {
                let delivery_progress = t.delivery_progress();
                let revenue_progress = t.revenue_progress();
                let on_track = delivery_progress >= expected && revenue_progress >= expected;
                TargetStatus { target: t, delivery_progress, revenue_progress, on_track }
            })
            .collect();
        statuses.sort_by(|a, b| {
            a.delivery_progress
                .partial_cmp(&b.delivery_progress)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(statuses)
    }

    /// Idempotent per `(driverId, date)`: a second call on the same day is a
    /// no-op, not an overwrite.
    pub async fn snapshot_daily(&self, date: NaiveDate) -> AppResult<usize> {
        let targets = self.gateway.list_targets().await?;
        let mut written = 0;
        for t in targets {
            if self.gateway.has_snapshot(&t.driver_id, date).await? {
                continue;
            }
            let achievement_percent = if t.target_deliveries > 0 {
                (t.current_deliveries as f64 / t.target_deliveries as f64) * 100.0
            } else {
                100.0
            };
            let snapshot = PerformanceSnapshot {
                driver_id: t.driver_id.clone(),
                date,
                deliveries_completed: t.current_deliveries,
                revenue_generated: t.current_revenue,
                target_deliveries: t.target_deliveries,
                target_revenue: t.target_revenue,
                target_achieved: t.current_deliveries >= t.target_deliveries
                    && t.current_revenue >= t.target_revenue,
                achievement_percent,
            };
            if self.gateway.upsert_snapshot(snapshot).await? {
                written += 1;
            }
        }
        Ok(written)
    }

    pub async fn reset(&self) -> AppResult<()> {
        self.gateway.reset_all_targets().await
    }
}

/// Fraction of the shift elapsed at `now`, clamped to `[0, 1]`. "Local" time
/// is treated as the instant's UTC wall-clock minutes-since-midnight; the
/// source gives no per-driver timezone to resolve against (see DESIGN.md).
fn expected_progress(now: DateTime<Utc>, cfg: &TargetsConfig) -> f64 {
    let minutes_since_midnight = (now.hour() * 60 + now.minute()) as f64;
    let start = cfg.shift_start_min as f64;
    let end = cfg.shift_end_min as f64;
    if end <= start {
        return 1.0;
    }
    ((minutes_since_midnight - start) / (end - start)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryStore;
    use chrono::TimeZone;

    fn tracker() -> TargetTracker {
        TargetTracker::new(
            Arc::new(PersistenceGateway::new(
                Arc::new(InMemoryStore::new()),
                crate::config::StoreTimeouts::default(),
                crate::config::BreakerConfig::default(),
            )),
            TargetsConfig::default(),
        )
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 30, hour, minute, 0).unwrap()
    }

    #[test]
    fn expected_progress_is_zero_before_shift_start() {
        let cfg = TargetsConfig::default();
        assert_eq!(expected_progress(at(6, 0), &cfg), 0.0);
    }

    #[test]
    fn expected_progress_is_one_after_shift_end() {
        let cfg = TargetsConfig::default();
        assert_eq!(expected_progress(at(22, 0), &cfg), 1.0);
    }

    #[test]
    fn expected_progress_is_half_at_shift_midpoint() {
        let cfg = TargetsConfig::default();
        assert!((expected_progress(at(14, 0), &cfg) - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn set_targets_resets_current_counters() {
        let tracker = tracker();
        tracker.set_targets(&[("d1".into(), 20, 1000.0)]).await.unwrap();
        tracker.increment_progress("d1", 5, 250.0).await.unwrap();
        tracker.set_targets(&[("d1".into(), 25, 1200.0)]).await.unwrap();

        let status = tracker.get_status("d1", at(12, 0)).await.unwrap().unwrap();
        assert_eq!(status.target.current_deliveries, 0);
        assert_eq!(status.target.target_deliveries, 25);
    }

    #[tokio::test]
    async fn increment_progress_fails_for_unknown_driver() {
        let tracker = tracker();
        let result = tracker.increment_progress("ghost", 1, 10.0).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_all_status_sorts_neediest_first() {
        let tracker = tracker();
        tracker.set_targets(&[("ahead".into(), 10, 100.0), ("behind".into(), 10, 100.0)]).await.unwrap();
        tracker.increment_progress("ahead", 8, 80.0).await.unwrap();
        tracker.increment_progress("behind", 1, 10.0).await.unwrap();

        let statuses = tracker.get_all_status(at(12, 0)).await.unwrap();
        assert_eq!(statuses[0].target.driver_id, "behind");
        assert_eq!(statuses[1].target.driver_id, "ahead");
    }

    #[tokio::test]
    async fn snapshot_daily_is_idempotent_within_the_same_day() {
        let tracker = tracker();
        tracker.set_targets(&[("d1".into(), 10, 500.0)]).await.unwrap();
        tracker.increment_progress("d1", 3, 150.0).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();
        let first = tracker.snapshot_daily(date).await.unwrap();
        let second = tracker.snapshot_daily(date).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn reset_zeroes_every_driver() {
        let tracker = tracker();
        tracker.set_targets(&[("d1".into(), 10, 500.0)]).await.unwrap();
        tracker.increment_progress("d1", 3, 150.0).await.unwrap();
        tracker.reset().await.unwrap();

        let status = tracker.get_status("d1", at(12, 0)).await.unwrap().unwrap();
        assert_eq!(status.target.current_deliveries, 0);
        assert_eq!(status.target.current_revenue, 0.0);
    }
}
