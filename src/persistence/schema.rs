use sqlx::PgPool;

use crate::error::{AppError, AppResult};

/// One table this core depends on, and the columns it reads or writes by
/// name. Enum-typed columns are checked by name only; the exact label set is
/// enforced by Postgres itself once the column exists.
struct RequiredTable {
    name: &'static str,
    columns: &'static [&'static str],
}

const REQUIRED_TABLES: &[RequiredTable] = &[
    RequiredTable {
        name: "orders",
        columns: &[
            "id",
            "customer_ref",
            "pickup_id",
            "status",
            "assigned_driver_id",
            "batch_id",
            "created_at",
            "sla_deadline",
            "last_status_change",
        ],
    },
    RequiredTable {
        name: "drivers",
        columns: &["id", "status", "capacity_kg", "current_lat", "current_lng", "last_heartbeat_at"],
    },
    RequiredTable { name: "pickup_points", columns: &["id", "lat", "lng", "name"] },
    RequiredTable {
        name: "driver_targets",
        columns: &["driver_id", "target_deliveries", "target_revenue", "current_deliveries", "current_revenue"],
    },
    RequiredTable { name: "performance_snapshots", columns: &["driver_id", "date", "target_achieved"] },
    RequiredTable { name: "routes", columns: &["id", "driver_id", "status", "ordered_stops"] },
    RequiredTable { name: "assignment_logs", columns: &["order_id", "driver_id", "assignment_type", "total_score"] },
    RequiredTable { name: "route_optimizations", columns: &["driver_id", "order_ids", "status"] },
    RequiredTable { name: "order_batches", columns: &["batch_number", "order_ids", "status"] },
    RequiredTable { name: "escalation_logs", columns: &["order_id", "escalation_type", "severity", "status"] },
    RequiredTable { name: "dispatch_alerts", columns: &["order_id", "alert_type", "severity", "resolved"] },
];

/// Verifies every table and column this core depends on exists before any
/// engine starts. Per the fail-closed design note: schema drift (a dropped
/// column, a table renamed out from under the core) is caught here instead
/// of surfacing as a confusing runtime error mid-cycle.
pub async fn verify_schema(pool: &PgPool) -> AppResult<()> {
    for table in REQUIRED_TABLES {
        let existing: Vec<String> = sqlx::query_scalar(
            "SELECT column_name FROM information_schema.columns WHERE table_name = $1",
        )
        .bind(table.name)
        .fetch_all(pool)
        .await?;

        if existing.is_empty() {
            return Err(AppError::Internal(format!("required table '{}' is missing", table.name)));
        }

        for column in table.columns {
            if !existing.iter().any(|c| c == column) {
                return Err(AppError::Internal(format!(
                    "required column '{}.{}' is missing",
                    table.name, column
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_tables_cover_every_log_and_entity() {
        let names: Vec<&str> = REQUIRED_TABLES.iter().map(|t| t.name).collect();
        assert!(names.contains(&"orders"));
        assert!(names.contains(&"escalation_logs"));
        assert!(names.contains(&"dispatch_alerts"));
        assert_eq!(names.len(), 11);
    }
}
