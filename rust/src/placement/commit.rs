//! Rule check for a concrete `(start, end)` write, run right before persisting it.
//!
//! Unlike the validator this never proposes a correction: the write is either
//! accepted as given or rejected with the first rule it breaks.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::error::EngineError;
use crate::models::{Operation, Placement, WorkOrder};
use crate::time::time_ranges_overlap;

/// First rule a write breaks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleViolation {
    EmptyRange,
    StartInPast,
    PredecessorUnfinished {
        predecessor_index: u32,
        predecessor_end: DateTime<Utc>,
    },
    SuccessorOverlap {
        successor_index: u32,
        successor_start: DateTime<Utc>,
    },
    MachineOverlap {
        machine_id: String,
        conflict_with: String,
    },
}

impl RuleViolation {
    /// Id of the operation the write collides with, for machine overlaps.
    pub fn conflict_with(&self) -> Option<&str> {
        match self {
            Self::MachineOverlap { conflict_with, .. } => Some(conflict_with),
            _ => None,
        }
    }
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRange => write!(f, "Start must be before end"),
            Self::StartInPast => write!(f, "Start cannot be before now"),
            Self::PredecessorUnfinished {
                predecessor_index, ..
            } => write!(
                f,
                "Operation must start after previous (idx {} ends)",
                predecessor_index
            ),
            Self::SuccessorOverlap {
                successor_index, ..
            } => write!(
                f,
                "Operation must end before next (idx {} starts)",
                successor_index
            ),
            Self::MachineOverlap {
                machine_id,
                conflict_with,
            } => write!(f, "overlap in lane {} with {}", machine_id, conflict_with),
        }
    }
}

/// Outcome of a commit-time check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitVerdict {
    Accepted(Placement),
    Rejected(RuleViolation),
}

impl CommitVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Check that writing `[new_start, new_end)` for `operation` keeps every invariant.
///
/// # Errors
/// * `EngineError` if the work order does not own the operation or is malformed,
///   or if a machine operation has an empty interval
pub fn check_update(
    operation: &Operation,
    new_start: DateTime<Utc>,
    new_end: DateTime<Utc>,
    work_order: Option<&WorkOrder>,
    all_operations: &[Operation],
    now: DateTime<Utc>,
) -> Result<CommitVerdict, EngineError> {
    if new_start >= new_end {
        return Ok(CommitVerdict::Rejected(RuleViolation::EmptyRange));
    }
    if new_start < now {
        return Ok(CommitVerdict::Rejected(RuleViolation::StartInPast));
    }

    if let Some(work_order) = work_order {
        if !work_order.owns(operation) {
            return Err(EngineError::ForeignOperation {
                operation_id: operation.id.clone(),
                work_order_id: work_order.id.clone(),
            });
        }
        work_order.sequence()?;

        if let Some(prev) = work_order.predecessor_of(operation) {
            if new_start < prev.end {
                return Ok(CommitVerdict::Rejected(
                    RuleViolation::PredecessorUnfinished {
                        predecessor_index: prev.index,
                        predecessor_end: prev.end,
                    },
                ));
            }
        }

        if let Some(next) = work_order.successor_of(operation) {
            if new_end > next.start {
                return Ok(CommitVerdict::Rejected(RuleViolation::SuccessorOverlap {
                    successor_index: next.index,
                    successor_start: next.start,
                }));
            }
        }
    }

    let mut siblings: Vec<&Operation> = all_operations
        .iter()
        .filter(|op| op.machine_id == operation.machine_id && op.id != operation.id)
        .collect();
    siblings.sort_by_key(|op| op.start);

    for sibling in siblings {
        sibling.ensure_positive_duration()?;
        if time_ranges_overlap(new_start, new_end, sibling.start, sibling.end) {
            return Ok(CommitVerdict::Rejected(RuleViolation::MachineOverlap {
                machine_id: operation.machine_id.clone(),
                conflict_with: sibling.id.clone(),
            }));
        }
    }

    Ok(CommitVerdict::Accepted(Placement {
        start: new_start,
        end: new_end,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
    }

    fn op(id: &str, index: u32, machine_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Operation {
        Operation {
            id: id.to_string(),
            work_order_id: "wo1".to_string(),
            index,
            machine_id: machine_id.to_string(),
            name: id.to_string(),
            start,
            end,
        }
    }

    fn fixture() -> (WorkOrder, Vec<Operation>) {
        let mut ops = vec![
            op("a", 0, "m1", t(8, 0), t(9, 0)),
            op("b", 1, "m2", t(9, 0), t(10, 0)),
            op("c", 2, "m1", t(12, 0), t(13, 0)),
        ];
        let wo = WorkOrder {
            id: "wo1".to_string(),
            product: "gear".to_string(),
            qty: 4,
            operations: ops.clone(),
        };
        let mut other = op("x", 0, "m2", t(10, 30), t(11, 0));
        other.work_order_id = "wo2".to_string();
        ops.push(other);
        (wo, ops)
    }

    fn check(target: usize, start: DateTime<Utc>, end: DateTime<Utc>) -> CommitVerdict {
        let (wo, ops) = fixture();
        check_update(&ops[target], start, end, Some(&wo), &ops, t(7, 0)).unwrap()
    }

    #[test]
    fn test_accepts_clean_write() {
        assert_eq!(
            check(1, t(9, 15), t(10, 15)),
            CommitVerdict::Accepted(Placement {
                start: t(9, 15),
                end: t(10, 15)
            })
        );
    }

    #[test]
    fn test_rejects_empty_range() {
        assert_eq!(
            check(1, t(10, 0), t(10, 0)),
            CommitVerdict::Rejected(RuleViolation::EmptyRange)
        );
    }

    #[test]
    fn test_rejects_past_start() {
        let (wo, ops) = fixture();
        let verdict = check_update(&ops[1], t(9, 0), t(10, 0), Some(&wo), &ops, t(9, 30)).unwrap();
        assert_eq!(verdict, CommitVerdict::Rejected(RuleViolation::StartInPast));
    }

    #[test]
    fn test_rejects_start_before_predecessor_end() {
        let verdict = check(1, t(8, 30), t(9, 30));
        assert_eq!(
            verdict,
            CommitVerdict::Rejected(RuleViolation::PredecessorUnfinished {
                predecessor_index: 0,
                predecessor_end: t(9, 0)
            })
        );
        if let CommitVerdict::Rejected(violation) = verdict {
            assert_eq!(
                violation.to_string(),
                "Operation must start after previous (idx 0 ends)"
            );
        }
    }

    #[test]
    fn test_rejects_end_after_successor_start() {
        assert!(matches!(
            check(1, t(11, 30), t(12, 30)),
            CommitVerdict::Rejected(RuleViolation::SuccessorOverlap {
                successor_index: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_machine_overlap_with_id() {
        let verdict = check(1, t(10, 0), t(11, 0));
        match verdict {
            CommitVerdict::Rejected(violation) => {
                assert_eq!(violation.conflict_with(), Some("x"));
                assert_eq!(violation.to_string(), "overlap in lane m2 with x");
            }
            CommitVerdict::Accepted(_) => panic!("expected overlap with x"),
        }
    }

    #[test]
    fn test_touching_sibling_is_accepted() {
        assert!(check(1, t(9, 30), t(10, 30)).is_accepted());
    }

    #[test]
    fn test_operation_without_work_order_id_is_checked_against_parent() {
        let (mut wo, mut ops) = fixture();
        for op in wo.operations.iter_mut().chain(ops.iter_mut().take(3)) {
            op.work_order_id = String::new();
        }
        assert!(check_update(&ops[1], t(9, 15), t(10, 15), Some(&wo), &ops, t(7, 0))
            .unwrap()
            .is_accepted());
        assert!(matches!(
            check_update(&ops[1], t(8, 30), t(9, 30), Some(&wo), &ops, t(7, 0)).unwrap(),
            CommitVerdict::Rejected(RuleViolation::PredecessorUnfinished { .. })
        ));
    }

    #[test]
    fn test_without_work_order_only_machine_rules_apply() {
        let (_, ops) = fixture();
        let verdict = check_update(&ops[1], t(7, 30), t(8, 30), None, &ops, t(7, 0)).unwrap();
        assert!(verdict.is_accepted());
    }
}
