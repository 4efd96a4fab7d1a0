use sea_orm::error::DbErr;
use serde::Serialize;
use uuid::Uuid;

/// Unified error type for all core services.
///
/// The first group carries the domain taxonomy of the stock subsystem; the
/// rest are the ambient failures any service operation can hit. Callers match
/// on the variant, not on message text.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// Reserve or commit asked for more units than the record can cover.
    /// Surfaced to the caller as-is; the business condition is real and must
    /// not be retried blindly.
    #[error("insufficient stock for record {stock_record_id}: requested {requested}, available {available}")]
    InsufficientStock {
        stock_record_id: Uuid,
        requested: i32,
        available: i32,
    },

    /// Percentage inputs that would divide by zero or fall outside [0, 100).
    #[error("invalid pricing input: {0}")]
    InvalidPricingInput(String),

    /// Operation against a (product, variant, size) triple that has no record.
    #[error("stock record not found: {0}")]
    StockRecordNotFound(Uuid),

    /// A state machine was asked to move from a state that does not permit it,
    /// including committing stock that was never reserved.
    #[error("illegal state transition: {0}")]
    IllegalStateTransition(String),

    #[error("database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("event error: {0}")]
    EventError(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    /// Stable machine-readable code, used in event payloads and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InsufficientStock { .. } => "insufficient_stock",
            ServiceError::InvalidPricingInput(_) => "invalid_pricing_input",
            ServiceError::StockRecordNotFound(_) => "stock_record_not_found",
            ServiceError::IllegalStateTransition(_) => "illegal_state_transition",
            ServiceError::DatabaseError(_) => "database_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::ValidationError(_) => "validation_error",
            ServiceError::EventError(_) => "event_error",
            ServiceError::InternalError(_) => "internal_error",
            ServiceError::Other(_) => "other",
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

/// Serializable error body for log sinks and external consumers.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl From<&ServiceError> for ErrorDetail {
    fn from(err: &ServiceError) -> Self {
        Self {
            code: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}
