//! Core data types for the placement engine.

use chrono::{DateTime, Duration, Utc};
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// An atomic timed task bound to one machine and one position in a work order.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[pyo3(get, set)]
    pub id: String,
    /// Owning work order. May be omitted in seed files, where the parent supplies it.
    #[pyo3(get, set)]
    #[serde(default)]
    pub work_order_id: String,
    /// Zero-based position in the work order's execution sequence.
    #[pyo3(get, set)]
    pub index: u32,
    #[pyo3(get, set)]
    pub machine_id: String,
    #[pyo3(get, set)]
    #[serde(default)]
    pub name: String,
    #[pyo3(get, set)]
    pub start: DateTime<Utc>,
    #[pyo3(get, set)]
    pub end: DateTime<Utc>,
}

impl Operation {
    /// Derived duration (`end - start`).
    #[inline]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Reject operations whose interval is empty or inverted.
    pub fn ensure_positive_duration(&self) -> Result<(), EngineError> {
        if self.end <= self.start {
            return Err(EngineError::NonPositiveDuration(self.id.clone()));
        }
        Ok(())
    }
}

#[pymethods]
impl Operation {
    #[new]
    #[pyo3(signature = (id, work_order_id, index, machine_id, start, end, name=String::new()))]
    fn new(
        id: String,
        work_order_id: String,
        index: u32,
        machine_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        name: String,
    ) -> Self {
        Self {
            id,
            work_order_id,
            index,
            machine_id,
            name,
            start,
            end,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Operation(id={:?}, work_order_id={:?}, index={}, machine_id={:?}, start={}, end={})",
            self.id, self.work_order_id, self.index, self.machine_id, self.start, self.end
        )
    }
}

/// An ordered group of operations that must run in `index` order.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    #[serde(default)]
    pub product: String,
    #[pyo3(get, set)]
    #[serde(default)]
    pub qty: u32,
    /// Insertion order is irrelevant; execution order is governed by `index`.
    #[pyo3(get, set)]
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl WorkOrder {
    /// Operation at the given sequence position, if any.
    pub fn operation_at(&self, index: u32) -> Option<&Operation> {
        self.operations.iter().find(|op| op.index == index)
    }

    /// Operation that must finish before `operation` may start.
    pub fn predecessor_of(&self, operation: &Operation) -> Option<&Operation> {
        operation
            .index
            .checked_sub(1)
            .and_then(|index| self.operation_at(index))
    }

    /// Operation that may only start once `operation` has finished.
    pub fn successor_of(&self, operation: &Operation) -> Option<&Operation> {
        operation
            .index
            .checked_add(1)
            .and_then(|index| self.operation_at(index))
    }

    /// Whether `operation` belongs here. An empty `work_order_id` is adopted.
    pub fn owns(&self, operation: &Operation) -> bool {
        operation.work_order_id.is_empty() || operation.work_order_id == self.id
    }

    /// Operations in execution order, after checking the sequence is well formed.
    ///
    /// Indices must be exactly `0..n` and every operation must be owned by this
    /// work order.
    pub fn sequence(&self) -> Result<Vec<&Operation>, EngineError> {
        let mut ordered: Vec<&Operation> = self.operations.iter().collect();
        ordered.sort_by_key(|op| op.index);

        for op in &ordered {
            if !self.owns(op) {
                return Err(EngineError::ForeignOperation {
                    operation_id: op.id.clone(),
                    work_order_id: self.id.clone(),
                });
            }
            op.ensure_positive_duration()?;
        }

        let indices: Vec<u32> = ordered.iter().map(|op| op.index).collect();
        check_index_sequence(&self.id, &indices)?;
        Ok(ordered)
    }
}

/// Check that sorted `indices` are exactly `0..n`.
pub(crate) fn check_index_sequence(work_order_id: &str, indices: &[u32]) -> Result<(), EngineError> {
    for (position, pair) in indices.windows(2).enumerate() {
        if pair[0] == pair[1] {
            return Err(EngineError::DuplicateIndex {
                work_order_id: work_order_id.to_string(),
                index: pair[1],
            });
        }
        // Sorted and distinct: a mismatch here means `position` itself is missing.
        if pair[0] as usize != position {
            return Err(EngineError::MissingIndex {
                work_order_id: work_order_id.to_string(),
                index: position as u32,
            });
        }
    }

    if let Some(&last) = indices.last() {
        let expected_last = (indices.len() - 1) as u32;
        if last != expected_last {
            let missing = (0..=expected_last)
                .find(|index| !indices.contains(index))
                .unwrap_or(expected_last);
            return Err(EngineError::MissingIndex {
                work_order_id: work_order_id.to_string(),
                index: missing,
            });
        }
    }
    Ok(())
}

#[pymethods]
impl WorkOrder {
    #[new]
    #[pyo3(signature = (id, operations, product=String::new(), qty=0))]
    fn new(id: String, operations: Vec<Operation>, product: String, qty: u32) -> Self {
        Self {
            id,
            product,
            qty,
            operations,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "WorkOrder(id={:?}, product={:?}, qty={}, operations={})",
            self.id,
            self.product,
            self.qty,
            self.operations.len()
        )
    }
}

/// A proposed or committed `(start, end)` assignment for one operation.
#[pyclass]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    #[pyo3(get)]
    pub start: DateTime<Utc>,
    #[pyo3(get)]
    pub end: DateTime<Utc>,
}

impl Placement {
    /// Placement starting at `start` that keeps `duration`.
    ///
    /// Near the end of the representable range the start is pulled back so
    /// the placement still ends at or before `MAX_UTC`.
    pub fn shifted(start: DateTime<Utc>, duration: Duration) -> Self {
        let start = start.min(crate::time::saturating_sub(DateTime::<Utc>::MAX_UTC, duration));
        Self {
            start,
            end: crate::time::saturating_add(start, duration),
        }
    }

    #[inline]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[pymethods]
impl Placement {
    fn __repr__(&self) -> String {
        format!("Placement(start={}, end={})", self.start, self.end)
    }
}

/// Kind of problem found among already-placed operations.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two operations on the same machine overlap in time.
    MachineOverlap,
    /// An operation starts before its predecessor in the same work order ends.
    SequenceViolation,
}

/// One detected conflict, keyed on a single operation.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    #[pyo3(get)]
    pub operation_id: String,
    /// Known conflicting ids. Not symmetric: the other side has no mirrored record.
    #[pyo3(get)]
    pub conflict_with: Vec<String>,
    #[pyo3(get)]
    #[serde(rename = "type")]
    pub kind: ConflictKind,
}

#[pymethods]
impl ConflictInfo {
    fn __repr__(&self) -> String {
        format!(
            "ConflictInfo(operation_id={:?}, conflict_with={:?}, kind={:?})",
            self.operation_id, self.conflict_with, self.kind
        )
    }
}
