//! Input errors raised at the engine boundary.
//!
//! Domain rejections (past placement, sequence, machine conflict) are verdicts,
//! not errors. Everything here means the caller handed over malformed data.

use chrono::Duration;
use thiserror::Error;

/// Malformed input rejected before any scheduling rule runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid input: operation {0} must end after it starts")]
    NonPositiveDuration(String),
    #[error("Invalid input: slot duration must be positive, got {0}")]
    NonPositiveSlotDuration(Duration),
    #[error("Invalid input: duplicate operation id {0}")]
    DuplicateOperation(String),
    #[error("Invalid input: work order {work_order_id} has index {index} more than once")]
    DuplicateIndex { work_order_id: String, index: u32 },
    #[error("Invalid input: work order {work_order_id} is missing index {index}")]
    MissingIndex { work_order_id: String, index: u32 },
    #[error("Invalid input: operation {operation_id} does not belong to work order {work_order_id}")]
    ForeignOperation {
        operation_id: String,
        work_order_id: String,
    },
    #[error("Invalid input: work order not found: {0}")]
    WorkOrderNotFound(String),
    #[error("Invalid input: operation not found: {0}")]
    OperationNotFound(String),
    #[error("Invalid input: malformed snapshot: {0}")]
    MalformedSnapshot(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::MalformedSnapshot(err.to_string())
    }
}
