//! Scheduling constraint engine for manufacturing operations.
//!
//! Detects machine overlaps and sequence violations among placed operations,
//! and validates (or corrects) a proposed start time for a single operation.
//! Every entry point is a pure function of its inputs plus an explicit `now`.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::{DateTime, Duration, Utc};
use pyo3::prelude::*;

mod config;
pub mod conflicts;
mod error;
pub mod logging;
mod models;
pub mod placement;
pub mod snapshot;
pub mod time;

pub use config::EngineConfig;
pub use conflicts::{conflicted_operation_ids, detect_conflicts, has_conflict, validate_operations};
pub use error::EngineError;
pub use models::{ConflictInfo, ConflictKind, Operation, Placement, WorkOrder};
pub use placement::{
    check_update, find_slot, validate_placement, CommitVerdict, MachineTimeline, PlacementVerdict,
    RejectionReason, RuleViolation, SlotChoice, SlotPhase,
};
pub use snapshot::Snapshot;
pub use time::{round_to_nearest_minutes, time_ranges_overlap};

fn to_py_err(err: EngineError) -> PyErr {
    pyo3::exceptions::PyValueError::new_err(err.to_string())
}

/// Flat verdict of a placement validation (PyO3 wrapper).
#[pyclass(name = "PlacementResult")]
#[derive(Clone, Debug)]
pub struct PyPlacementResult {
    #[pyo3(get)]
    pub valid: bool,
    #[pyo3(get)]
    pub corrected_start: Option<DateTime<Utc>>,
    #[pyo3(get)]
    pub corrected_end: Option<DateTime<Utc>>,
    #[pyo3(get)]
    pub reason: Option<String>,
}

impl From<PlacementVerdict> for PyPlacementResult {
    fn from(verdict: PlacementVerdict) -> Self {
        match verdict {
            PlacementVerdict::Valid => Self {
                valid: true,
                corrected_start: None,
                corrected_end: None,
                reason: None,
            },
            PlacementVerdict::Invalid { correction, reason } => Self {
                valid: false,
                corrected_start: Some(correction.start),
                corrected_end: Some(correction.end),
                reason: Some(reason.to_string()),
            },
        }
    }
}

#[pymethods]
impl PyPlacementResult {
    fn __repr__(&self) -> String {
        format!(
            "PlacementResult(valid={}, corrected_start={:?}, reason={:?})",
            self.valid, self.corrected_start, self.reason
        )
    }
}

/// Flat verdict of a commit-time update check (PyO3 wrapper).
#[pyclass(name = "UpdateResult")]
#[derive(Clone, Debug)]
pub struct PyUpdateResult {
    #[pyo3(get)]
    pub accepted: bool,
    #[pyo3(get)]
    pub message: Option<String>,
    #[pyo3(get)]
    pub conflict_with: Option<String>,
}

impl From<CommitVerdict> for PyUpdateResult {
    fn from(verdict: CommitVerdict) -> Self {
        match verdict {
            CommitVerdict::Accepted(_) => Self {
                accepted: true,
                message: None,
                conflict_with: None,
            },
            CommitVerdict::Rejected(violation) => Self {
                accepted: false,
                message: Some(violation.to_string()),
                conflict_with: violation.conflict_with().map(str::to_string),
            },
        }
    }
}

#[pymethods]
impl PyUpdateResult {
    fn __repr__(&self) -> String {
        format!(
            "UpdateResult(accepted={}, message={:?}, conflict_with={:?})",
            self.accepted, self.message, self.conflict_with
        )
    }
}

/// Report machine overlaps and sequence violations among placed operations.
///
/// # Raises
/// * ValueError on empty intervals, duplicate ids or a broken index sequence
#[pyfunction]
#[pyo3(name = "detect_conflicts")]
fn py_detect_conflicts(operations: Vec<Operation>) -> PyResult<Vec<ConflictInfo>> {
    detect_conflicts(&operations).map_err(to_py_err)
}

/// Validate moving `operation` to start at `proposed_start`.
///
/// # Arguments
/// * `operation` - The operation being moved (its current interval gives the duration)
/// * `proposed_start` - Requested new start
/// * `work_order` - The operation's work order, or None if unknown
/// * `all_operations` - Every placed operation (machine occupancy)
/// * `now` - Current time; nothing may be placed before it
/// * `config` - Engine configuration (defaults if omitted)
///
/// # Raises
/// * ValueError on malformed input (empty intervals, broken index sequence)
#[pyfunction]
#[pyo3(
    name = "validate_placement",
    signature = (operation, proposed_start, work_order, all_operations, now, config=None)
)]
fn py_validate_placement(
    operation: Operation,
    proposed_start: DateTime<Utc>,
    work_order: Option<WorkOrder>,
    all_operations: Vec<Operation>,
    now: DateTime<Utc>,
    config: Option<EngineConfig>,
) -> PyResult<PyPlacementResult> {
    let config = config.unwrap_or_default();
    validate_placement(
        &operation,
        proposed_start,
        work_order.as_ref(),
        &all_operations,
        now,
        &config,
    )
    .map(PyPlacementResult::from)
    .map_err(to_py_err)
}

/// Find the nearest free start on a machine within `[earliest_start, latest_start]`.
#[pyfunction]
#[pyo3(name = "find_slot")]
fn py_find_slot(
    preferred_start: DateTime<Utc>,
    duration: Duration,
    machine_operations: Vec<Operation>,
    earliest_start: DateTime<Utc>,
    latest_start: DateTime<Utc>,
) -> PyResult<DateTime<Utc>> {
    find_slot(
        preferred_start,
        duration,
        &machine_operations,
        earliest_start,
        latest_start,
    )
    .map_err(to_py_err)
}

/// Check an exact `(new_start, new_end)` write before it is persisted.
#[pyfunction]
#[pyo3(
    name = "check_update",
    signature = (operation, new_start, new_end, work_order, all_operations, now)
)]
fn py_check_update(
    operation: Operation,
    new_start: DateTime<Utc>,
    new_end: DateTime<Utc>,
    work_order: Option<WorkOrder>,
    all_operations: Vec<Operation>,
    now: DateTime<Utc>,
) -> PyResult<PyUpdateResult> {
    check_update(
        &operation,
        new_start,
        new_end,
        work_order.as_ref(),
        &all_operations,
        now,
    )
    .map(PyUpdateResult::from)
    .map_err(to_py_err)
}

/// The placement_engine Python module.
#[pymodule]
fn placement_engine(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Core data types
    m.add_class::<Operation>()?;
    m.add_class::<WorkOrder>()?;
    m.add_class::<Placement>()?;
    m.add_class::<ConflictInfo>()?;
    m.add_class::<ConflictKind>()?;
    m.add_class::<PyPlacementResult>()?;
    m.add_class::<PyUpdateResult>()?;

    // Config types
    m.add_class::<EngineConfig>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(py_detect_conflicts, m)?)?;
    m.add_function(wrap_pyfunction!(py_validate_placement, m)?)?;
    m.add_function(wrap_pyfunction!(py_find_slot, m)?)?;
    m.add_function(wrap_pyfunction!(py_check_update, m)?)?;

    Ok(())
}
