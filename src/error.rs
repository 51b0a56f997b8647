use thiserror::Error;

/// The five error kinds from the core's error taxonomy. Each carries enough
/// context for a caller to decide whether to retry, surface to a user, or
/// escalate, without leaking store-specific detail across the boundary.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed input. Never retried by the core.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No driver or vehicle admissible for the request.
    #[error("no capacity available: {0}")]
    NoCapacity(String),

    /// Timeout, connection drop, or lock wait against the store.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A decision did not complete within its budget.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Constraint violation surfaced as a conflict, not a server error.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invariant violation. Logged with full context and escalated.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// `true` for kinds the cycle orchestrator may legitimately retry on the
    /// next tick rather than escalate immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::StoreUnavailable(_) | AppError::Timeout(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;
