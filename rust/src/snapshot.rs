//! Validated snapshot of work orders, the boundary where malformed input is rejected.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;

use crate::config::EngineConfig;
use crate::conflicts::collect_conflicts;
use crate::error::EngineError;
use crate::models::{ConflictInfo, Operation, Placement, WorkOrder};
use crate::placement::{check_update, validate_placement, CommitVerdict, PlacementVerdict};
use crate::time::round_to_nearest_minutes;
use crate::log_checks;

/// A consistent, read-only view of every work order and operation.
///
/// Construction checks every precondition once (positive durations, unique
/// operation ids, indices `0..n` per work order), so queries afterwards only
/// fail on unknown ids.
#[derive(Clone, Debug)]
pub struct Snapshot {
    work_orders: Vec<WorkOrder>,
    operations: Vec<Operation>,
    operation_index: FxHashMap<String, usize>,
    work_order_index: FxHashMap<String, usize>,
}

impl Snapshot {
    /// Build a snapshot, filling in missing `work_order_id`s from the parent.
    pub fn new(mut work_orders: Vec<WorkOrder>) -> Result<Self, EngineError> {
        let mut operations = Vec::new();
        let mut operation_index = FxHashMap::default();
        let mut work_order_index = FxHashMap::default();

        for (position, work_order) in work_orders.iter_mut().enumerate() {
            if work_order_index
                .insert(work_order.id.clone(), position)
                .is_some()
            {
                return Err(EngineError::MalformedSnapshot(format!(
                    "duplicate work order id {}",
                    work_order.id
                )));
            }

            for op in &mut work_order.operations {
                if op.work_order_id.is_empty() {
                    op.work_order_id = work_order.id.clone();
                }
            }
            work_order.sequence()?;

            for op in &work_order.operations {
                if operation_index
                    .insert(op.id.clone(), operations.len())
                    .is_some()
                {
                    return Err(EngineError::DuplicateOperation(op.id.clone()));
                }
                operations.push(op.clone());
            }
        }

        Ok(Self {
            work_orders,
            operations,
            operation_index,
            work_order_index,
        })
    }

    /// Parse the work order list wire format (camelCase, RFC 3339 timestamps).
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let work_orders: Vec<WorkOrder> = serde_json::from_str(json)?;
        Self::new(work_orders)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(&self.work_orders)?)
    }

    pub fn work_orders(&self) -> &[WorkOrder] {
        &self.work_orders
    }

    /// Every operation, flattened in work order order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operation(&self, id: &str) -> Option<&Operation> {
        self.operation_index.get(id).map(|&i| &self.operations[i])
    }

    pub fn work_order(&self, id: &str) -> Option<&WorkOrder> {
        self.work_order_index.get(id).map(|&i| &self.work_orders[i])
    }

    /// Operations bound to `machine_id`, sorted by start.
    pub fn machine_operations(&self, machine_id: &str) -> Vec<&Operation> {
        let mut ops: Vec<&Operation> = self
            .operations
            .iter()
            .filter(|op| op.machine_id == machine_id)
            .collect();
        ops.sort_by_key(|op| op.start);
        ops
    }

    /// Conflicts among the snapshot's operations; the input was checked in `new`.
    pub fn detect_conflicts(&self) -> Vec<ConflictInfo> {
        collect_conflicts(&self.operations)
    }

    fn require_operation(&self, operation_id: &str) -> Result<&Operation, EngineError> {
        self.operation(operation_id)
            .ok_or_else(|| EngineError::OperationNotFound(operation_id.to_string()))
    }

    /// Validate moving `operation_id` to start at `proposed_start`.
    pub fn validate_move(
        &self,
        operation_id: &str,
        proposed_start: DateTime<Utc>,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Result<PlacementVerdict, EngineError> {
        let operation = self.require_operation(operation_id)?;
        validate_placement(
            operation,
            proposed_start,
            self.work_order(&operation.work_order_id),
            &self.operations,
            now,
            config,
        )
    }

    /// Snap a dropped start to the configured grid and validate it.
    ///
    /// Returns the placement to commit, or `None` if the snapped start is
    /// rejected (the caller keeps the operation where it was).
    pub fn plan_drop(
        &self,
        operation_id: &str,
        dropped_start: DateTime<Utc>,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Result<Option<Placement>, EngineError> {
        let operation = self.require_operation(operation_id)?;
        let snapped = round_to_nearest_minutes(dropped_start, config.snap_minutes);
        log_checks!(
            config.verbosity,
            "Drop of {} at {} snapped to {}",
            operation_id,
            dropped_start,
            snapped
        );

        let verdict = self.validate_move(operation_id, snapped, now, config)?;
        Ok(verdict
            .is_valid()
            .then(|| Placement::shifted(snapped, operation.duration())))
    }

    /// Commit-time check of an exact `(start, end)` write for `operation_id`.
    pub fn check_update(
        &self,
        operation_id: &str,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CommitVerdict, EngineError> {
        let operation = self.require_operation(operation_id)?;
        check_update(
            operation,
            new_start,
            new_end,
            self.work_order(&operation.work_order_id),
            &self.operations,
            now,
        )
    }
}
