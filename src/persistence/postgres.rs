use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::{
    AssignmentLog, AssignmentType, Driver, DriverTarget, EscalationLog, EscalationType, Order,
    OrderBatch, OrderStatus, PerformanceSnapshot, PickupPoint, Route, RouteOptimizationLog,
};

use super::store::{AssignOutcome, Store};

/// Postgres-backed implementation, following the teacher's `db/` module
/// shape: one `sqlx::query_as` per operation against a shared `PgPool`.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_order(&self, order_id: &str) -> AppResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    async fn list_candidate_drivers(&self, pickup: &PickupPoint) -> AppResult<Vec<Driver>> {
        // Region filtering is left to the external store's spatial index;
        // here we simply require `status = 'available'` and let the scorer's
        // hard gate reject anything too far from `pickup`.
        let _ = pickup;
        let drivers = sqlx::query_as::<_, Driver>(
            "SELECT * FROM drivers WHERE status = 'available' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(drivers)
    }

    async fn list_all_drivers(&self) -> AppResult<Vec<Driver>> {
        let drivers = sqlx::query_as::<_, Driver>("SELECT * FROM drivers ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(drivers)
    }

    async fn get_driver(&self, driver_id: &str) -> AppResult<Option<Driver>> {
        let driver = sqlx::query_as::<_, Driver>("SELECT * FROM drivers WHERE id = $1")
            .bind(driver_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(driver)
    }

    async fn list_pickups(&self) -> AppResult<Vec<PickupPoint>> {
        let pickups = sqlx::query_as::<_, PickupPoint>("SELECT * FROM pickup_points ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(pickups)
    }

    async fn get_pickup(&self, pickup_id: &str) -> AppResult<Option<PickupPoint>> {
        let pickup = sqlx::query_as::<_, PickupPoint>("SELECT * FROM pickup_points WHERE id = $1")
            .bind(pickup_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(pickup)
    }

    async fn assign_order(
        &self,
        order_id: &str,
        driver_id: &str,
        _assignment_type: AssignmentType,
        log: AssignmentLog,
    ) -> AppResult<AssignOutcome> {
        let mut tx = self.pool.begin().await?;

        // Row-level lock, then check status inside the same transaction so
        // two concurrent assignments to the same order serialize here.
        let order: Option<Order> =
            sqlx::query_as("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(mut order) = order else {
            return Err(crate::error::AppError::Validation(format!(
                "unknown order {order_id}"
            )));
        };

        if order.status != OrderStatus::Pending {
            tx.rollback().await?;
            return Ok(AssignOutcome { order, already_assigned: true });
        }

        sqlx::query(
            "UPDATE orders SET status = 'assigned', assigned_driver_id = $1, last_status_change = NOW()
             WHERE id = $2",
        )
        .bind(driver_id)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO assignment_logs
                (order_id, driver_id, assignment_type, total_score, distance_score, time_score,
                 load_score, priority_score, reason, alternatives_count, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&log.order_id)
        .bind(&log.driver_id)
        .bind(log.assignment_type)
        .bind(log.total_score)
        .bind(log.distance_score)
        .bind(log.time_score)
        .bind(log.load_score)
        .bind(log.priority_score)
        .bind(&log.reason)
        .bind(log.alternatives_count)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        order.status = OrderStatus::Assigned;
        order.assigned_driver_id = Some(driver_id.to_string());
        Ok(AssignOutcome { order, already_assigned: false })
    }

    async fn list_pending_orders(&self) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE status = 'pending'")
            .fetch_all(&self.pool)
            .await?;
        Ok(orders)
    }

    async fn list_active_orders(&self) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE status NOT IN ('delivered', 'cancelled', 'failed')",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn set_order_batch(&self, order_id: &str, batch_id: &str) -> AppResult<()> {
        sqlx::query("UPDATE orders SET batch_id = $1 WHERE id = $2")
            .bind(batch_id)
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> AppResult<()> {
        sqlx::query("UPDATE orders SET status = $1, last_status_change = NOW() WHERE id = $2")
            .bind(status)
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_targets(&self, drivers: &[(String, i64, f64)]) -> AppResult<usize> {
        let mut tx = self.pool.begin().await?;
        for (driver_id, target_deliveries, target_revenue) in drivers {
            sqlx::query(
                "INSERT INTO driver_targets
                    (driver_id, target_deliveries, target_revenue, current_deliveries, current_revenue,
                     status, created_at, updated_at)
                 VALUES ($1, $2, $3, 0, 0, 'active', NOW(), NOW())
                 ON CONFLICT (driver_id) DO UPDATE SET
                    target_deliveries = EXCLUDED.target_deliveries,
                    target_revenue = EXCLUDED.target_revenue,
                    current_deliveries = 0,
                    current_revenue = 0,
                    updated_at = NOW()",
            )
            .bind(driver_id)
            .bind(target_deliveries)
            .bind(target_revenue)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(drivers.len())
    }

    async fn increment_progress(&self, driver_id: &str, deliveries: i64, revenue: f64) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE driver_targets
             SET current_deliveries = current_deliveries + $1,
                 current_revenue = current_revenue + $2,
                 updated_at = NOW()
             WHERE driver_id = $3",
        )
        .bind(deliveries)
        .bind(revenue)
        .bind(driver_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(crate::error::AppError::Validation(format!(
                "no target row for driver {driver_id}"
            )));
        }
        Ok(())
    }

    async fn get_target(&self, driver_id: &str) -> AppResult<Option<DriverTarget>> {
        let target =
            sqlx::query_as::<_, DriverTarget>("SELECT * FROM driver_targets WHERE driver_id = $1")
                .bind(driver_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(target)
    }

    async fn list_targets(&self) -> AppResult<Vec<DriverTarget>> {
        let targets = sqlx::query_as::<_, DriverTarget>(
            "SELECT * FROM driver_targets ORDER BY current_deliveries ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(targets)
    }

    async fn upsert_snapshot(&self, snapshot: PerformanceSnapshot) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO performance_snapshots
                (driver_id, date, deliveries_completed, revenue_generated, target_deliveries,
                 target_revenue, target_achieved, achievement_percent)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (driver_id, date) DO NOTHING",
        )
        .bind(&snapshot.driver_id)
        .bind(snapshot.date)
        .bind(snapshot.deliveries_completed)
        .bind(snapshot.revenue_generated)
        .bind(snapshot.target_deliveries)
        .bind(snapshot.target_revenue)
        .bind(snapshot.target_achieved)
        .bind(snapshot.achievement_percent)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset_all_targets(&self) -> AppResult<()> {
        sqlx::query(
            "UPDATE driver_targets SET current_deliveries = 0, current_revenue = 0, updated_at = NOW()",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_routes(&self, routes: &[Route]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        for route in routes {
            sqlx::query(
                "INSERT INTO routes
                    (id, driver_id, vehicle_id, pickup_id, ordered_stops, total_distance_km,
                     total_duration_min, status, created_at, optimized_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(&route.id)
            .bind(&route.driver_id)
            .bind(&route.vehicle_id)
            .bind(&route.pickup_id)
            .bind(sqlx::types::Json(&route.ordered_stops))
            .bind(route.total_distance_km)
            .bind(route.total_duration_min)
            .bind(route.status)
            .bind(route.created_at)
            .bind(route.optimized_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn append_route_optimization_log(&self, log: RouteOptimizationLog) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO route_optimizations
                (driver_id, order_ids, original_distance, optimized_distance, distance_saved_km,
                 time_saved_min, stops_reordered, improvement_pct, algorithm, status, created_at,
                 optimized_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(&log.driver_id)
        .bind(&log.order_ids)
        .bind(log.original_distance)
        .bind(log.optimized_distance)
        .bind(log.distance_saved_km)
        .bind(log.time_saved_min)
        .bind(log.stops_reordered)
        .bind(log.improvement_pct)
        .bind(&log.algorithm)
        .bind(log.status)
        .bind(log.created_at)
        .bind(log.optimized_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_batch(&self, batch: OrderBatch) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO order_batches
                (batch_number, driver_id, order_ids, order_count, total_distance_km,
                 estimated_duration_min, delivery_zone, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&batch.batch_number)
        .bind(&batch.driver_id)
        .bind(&batch.order_ids)
        .bind(batch.order_count)
        .bind(batch.total_distance_km)
        .bind(batch.estimated_duration_min)
        .bind(&batch.delivery_zone)
        .bind(batch.status)
        .bind(batch.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn open_escalation(
        &self,
        order_id: &str,
        escalation_type: EscalationType,
        since: DateTime<Utc>,
    ) -> AppResult<Option<EscalationLog>> {
        let log = sqlx::query_as::<_, EscalationLog>(
            "SELECT * FROM escalation_logs
             WHERE order_id = $1 AND escalation_type = $2 AND resolved_at IS NULL AND created_at >= $3
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(order_id)
        .bind(escalation_type)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;
        Ok(log)
    }

    async fn append_escalation_log(&self, log: EscalationLog) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO escalation_logs
                (order_id, driver_id, escalation_type, severity, status, reason, current_delay_min,
                 created_at, resolved_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&log.order_id)
        .bind(&log.driver_id)
        .bind(log.r#type)
        .bind(log.severity)
        .bind(log.status)
        .bind(&log.reason)
        .bind(log.current_delay_min)
        .bind(log.created_at)
        .bind(log.resolved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_dispatch_alert(&self, alert: crate::models::DispatchAlert) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO dispatch_alerts (order_id, alert_type, severity, message, resolved, created_at, resolved_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&alert.order_id)
        .bind(alert.r#type)
        .bind(alert.severity)
        .bind(&alert.message)
        .bind(alert.resolved)
        .bind(alert.created_at)
        .bind(alert.resolved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn has_snapshot(&self, driver_id: &str, date: NaiveDate) -> AppResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM performance_snapshots WHERE driver_id = $1 AND date = $2",
        )
        .bind(driver_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}
