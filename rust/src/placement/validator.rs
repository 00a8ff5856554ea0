//! Validation of a proposed start time for one operation.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{Operation, Placement, WorkOrder};
use crate::time::{saturating_add, saturating_sub};
use crate::{log_checks, log_verdicts};

use super::machine_timeline::{MachineTimeline, SlotPhase};

/// Why a proposed placement was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectionReason {
    /// Proposed start lies before `now`.
    PastPlacement,
    /// Predecessor in the same work order has not finished yet.
    PredecessorUnfinished {
        operation_id: String,
        name: String,
    },
    /// Operation would still be running when its successor starts.
    SuccessorOverlap {
        operation_id: String,
        name: String,
    },
    /// The machine is busy; the correction comes from the slot search.
    MachineConflict { phase: SlotPhase },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PastPlacement => write!(f, "Cannot schedule in the past"),
            Self::PredecessorUnfinished { name, .. } => write!(f, "Must start after {} ends", name),
            Self::SuccessorOverlap { name, .. } => write!(f, "Must end before {} starts", name),
            Self::MachineConflict { .. } => write!(f, "Machine conflict detected"),
        }
    }
}

/// Outcome of validating a proposed start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlacementVerdict {
    Valid,
    Invalid {
        /// Nearest legal placement found, duration preserved.
        correction: Placement,
        reason: RejectionReason,
    },
}

impl PlacementVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn corrected_start(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Valid => None,
            Self::Invalid { correction, .. } => Some(correction.start),
        }
    }

    pub fn reason(&self) -> Option<&RejectionReason> {
        match self {
            Self::Valid => None,
            Self::Invalid { reason, .. } => Some(reason),
        }
    }

    /// Start a caller should show or commit for `proposed_start`.
    pub fn resolved_start(&self, proposed_start: DateTime<Utc>) -> DateTime<Utc> {
        self.corrected_start().unwrap_or(proposed_start)
    }

    fn invalid(start: DateTime<Utc>, duration: Duration, reason: RejectionReason) -> Self {
        Self::Invalid {
            correction: Placement::shifted(start, duration),
            reason,
        }
    }
}

/// Decide whether `operation` may start at `proposed_start`.
///
/// Rules are checked in order and the first failing one wins:
/// 1. no placement before `now`
/// 2. not before the predecessor's end
/// 3. not so late that the successor would be overlapped
/// 4. the machine must be free, otherwise the slot search proposes a start
///
/// A missing `work_order` means sequencing cannot be checked: the placement is
/// accepted unless `config.require_work_order` is set.
///
/// # Errors
/// * `EngineError` if the operation, the work order or any machine operation is malformed
pub fn validate_placement(
    operation: &Operation,
    proposed_start: DateTime<Utc>,
    work_order: Option<&WorkOrder>,
    all_operations: &[Operation],
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<PlacementVerdict, EngineError> {
    operation.ensure_positive_duration()?;
    let verbosity = config.verbosity;
    let duration = operation.duration();

    log_checks!(
        verbosity,
        "Validating {} at {} (now {})",
        operation.id,
        proposed_start,
        now
    );

    if proposed_start < now {
        log_verdicts!(verbosity, "  {} rejected: in the past, corrected to {}", operation.id, now);
        return Ok(PlacementVerdict::invalid(
            now,
            duration,
            RejectionReason::PastPlacement,
        ));
    }

    let Some(work_order) = work_order else {
        if config.require_work_order {
            return Err(EngineError::WorkOrderNotFound(operation.work_order_id.clone()));
        }
        log_checks!(verbosity, "  {} has no work order context, accepting", operation.id);
        return Ok(PlacementVerdict::Valid);
    };

    if !work_order.owns(operation) {
        return Err(EngineError::ForeignOperation {
            operation_id: operation.id.clone(),
            work_order_id: work_order.id.clone(),
        });
    }
    work_order.sequence()?;

    let predecessor = work_order.predecessor_of(operation);
    if let Some(prev) = predecessor {
        if proposed_start < prev.end {
            log_verdicts!(
                verbosity,
                "  {} rejected: starts before {} ends, corrected to {}",
                operation.id,
                prev.id,
                prev.end
            );
            return Ok(PlacementVerdict::invalid(
                prev.end,
                duration,
                RejectionReason::PredecessorUnfinished {
                    operation_id: prev.id.clone(),
                    name: prev.name.clone(),
                },
            ));
        }
    }

    let successor = work_order.successor_of(operation);
    let latest_before_successor = successor.map(|next| saturating_sub(next.start, duration));
    if let (Some(next), Some(latest)) = (successor, latest_before_successor) {
        if proposed_start > latest {
            log_verdicts!(
                verbosity,
                "  {} rejected: overlaps {}, corrected to {}",
                operation.id,
                next.id,
                latest
            );
            return Ok(PlacementVerdict::invalid(
                latest,
                duration,
                RejectionReason::SuccessorOverlap {
                    operation_id: next.id.clone(),
                    name: next.name.clone(),
                },
            ));
        }
    }

    let earliest_start = predecessor.map_or(now, |prev| prev.end);
    let latest_start = latest_before_successor
        .unwrap_or_else(|| saturating_add(now, config.search_horizon()));

    let timeline = MachineTimeline::from_operations(
        &operation.machine_id,
        all_operations,
        Some(operation.id.as_str()),
    )?;
    let choice = timeline.search(
        proposed_start,
        duration,
        earliest_start,
        latest_start,
        verbosity,
    );

    if choice.start != proposed_start {
        log_verdicts!(
            verbosity,
            "  {} rejected: machine {} busy, corrected to {} ({:?})",
            operation.id,
            operation.machine_id,
            choice.start,
            choice.phase
        );
        return Ok(PlacementVerdict::invalid(
            choice.start,
            duration,
            RejectionReason::MachineConflict {
                phase: choice.phase,
            },
        ));
    }

    log_checks!(verbosity, "  {} accepted at {}", operation.id, proposed_start);
    Ok(PlacementVerdict::Valid)
}
