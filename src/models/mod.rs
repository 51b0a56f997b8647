pub mod alert;
pub mod assignment_log;
pub mod batch;
pub mod driver;
pub mod escalation;
pub mod order;
pub mod pickup;
pub mod route;
pub mod target;

pub use alert::{AlertType, DispatchAlert};
pub use assignment_log::{AssignmentLog, AssignmentType};
pub use batch::{BatchStatus, OrderBatch};
pub use driver::{Driver, DriverStatus};
pub use escalation::{EscalationLog, EscalationSeverity, EscalationStatus, EscalationType};
pub use order::{Order, OrderStatus};
pub use pickup::PickupPoint;
pub use route::{OptimizationStatus, Route, RouteOptimizationLog, RouteStatus, RouteStop};
pub use target::{DriverTarget, PerformanceSnapshot, TargetStatus};
