//! Conflict detection over already-placed operations.
//!
//! Reports problems, never fixes them. Two passes:
//! 1. machine overlap: every overlapping pair on the same machine
//! 2. sequence violation: adjacent indices in a work order that start too early

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::EngineError;
use crate::models::{check_index_sequence, ConflictInfo, ConflictKind, Operation};
use crate::time::time_ranges_overlap;

/// Group operations by a string key, keeping groups in first-seen order.
fn group_by<'a>(
    operations: &'a [Operation],
    key: impl Fn(&'a Operation) -> &'a str,
) -> Vec<Vec<&'a Operation>> {
    let mut slots: FxHashMap<&str, usize> = FxHashMap::default();
    let mut groups: Vec<Vec<&Operation>> = Vec::new();

    for op in operations {
        let slot = *slots.entry(key(op)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(op);
    }

    groups
}

fn machine_overlaps(operations: &[Operation], conflicts: &mut Vec<ConflictInfo>) {
    for ops in group_by(operations, |op| op.machine_id.as_str()) {
        for (i, first) in ops.iter().enumerate() {
            for second in &ops[i + 1..] {
                if time_ranges_overlap(first.start, first.end, second.start, second.end) {
                    conflicts.push(ConflictInfo {
                        operation_id: first.id.clone(),
                        conflict_with: vec![second.id.clone()],
                        kind: ConflictKind::MachineOverlap,
                    });
                }
            }
        }
    }
}

fn sequence_violations(operations: &[Operation], conflicts: &mut Vec<ConflictInfo>) {
    for mut ops in group_by(operations, |op| op.work_order_id.as_str()) {
        ops.sort_by_key(|op| op.index);
        for pair in ops.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            if next.start < current.end {
                conflicts.push(ConflictInfo {
                    operation_id: next.id.clone(),
                    conflict_with: vec![current.id.clone()],
                    kind: ConflictKind::SequenceViolation,
                });
            }
        }
    }
}

/// Reject operation lists no work order could have produced.
///
/// Every interval must be non-empty, ids unique, and each work order's
/// indices exactly `0..n`.
pub fn validate_operations(operations: &[Operation]) -> Result<(), EngineError> {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    for op in operations {
        op.ensure_positive_duration()?;
        if !seen.insert(op.id.as_str()) {
            return Err(EngineError::DuplicateOperation(op.id.clone()));
        }
    }

    for ops in group_by(operations, |op| op.work_order_id.as_str()) {
        let mut indices: Vec<u32> = ops.iter().map(|op| op.index).collect();
        indices.sort_unstable();
        check_index_sequence(&ops[0].work_order_id, &indices)?;
    }
    Ok(())
}

/// Report every machine overlap and every adjacent-index sequence violation.
///
/// Overlap records are keyed on the operation seen first and are not mirrored
/// for the other side. Result order follows grouping order, not time.
pub fn detect_conflicts(operations: &[Operation]) -> Result<Vec<ConflictInfo>, EngineError> {
    validate_operations(operations)?;
    Ok(collect_conflicts(operations))
}

/// Conflict passes over operations already known to be well formed.
pub(crate) fn collect_conflicts(operations: &[Operation]) -> Vec<ConflictInfo> {
    let mut conflicts = Vec::new();
    machine_overlaps(operations, &mut conflicts);
    sequence_violations(operations, &mut conflicts);
    conflicts
}

/// Ids of every operation involved in a conflict, on either side.
pub fn conflicted_operation_ids(conflicts: &[ConflictInfo]) -> FxHashSet<&str> {
    conflicts
        .iter()
        .flat_map(|c| {
            std::iter::once(c.operation_id.as_str())
                .chain(c.conflict_with.iter().map(String::as_str))
        })
        .collect()
}

/// Whether `operation_id` is the key of, or listed in, any conflict.
pub fn has_conflict(operation_id: &str, conflicts: &[ConflictInfo]) -> bool {
    conflicts.iter().any(|c| {
        c.operation_id == operation_id || c.conflict_with.iter().any(|id| id == operation_id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn t(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
    }

    fn op(
        id: &str,
        work_order_id: &str,
        index: u32,
        machine_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Operation {
        Operation {
            id: id.to_string(),
            work_order_id: work_order_id.to_string(),
            index,
            machine_id: machine_id.to_string(),
            name: String::new(),
            start,
            end,
        }
    }

    fn overlap(a: &str, b: &str) -> ConflictInfo {
        ConflictInfo {
            operation_id: a.to_string(),
            conflict_with: vec![b.to_string()],
            kind: ConflictKind::MachineOverlap,
        }
    }

    fn violation(later: &str, earlier: &str) -> ConflictInfo {
        ConflictInfo {
            operation_id: later.to_string(),
            conflict_with: vec![earlier.to_string()],
            kind: ConflictKind::SequenceViolation,
        }
    }

    #[test]
    fn test_clean_schedule_has_no_conflicts() {
        let ops = vec![
            op("a", "wo1", 0, "m1", t(8, 0), t(9, 0)),
            op("b", "wo1", 1, "m2", t(9, 0), t(10, 0)),
            op("c", "wo2", 0, "m1", t(9, 0), t(10, 0)),
        ];
        assert!(detect_conflicts(&ops).unwrap().is_empty());
    }

    #[test]
    fn test_machine_overlap_keyed_on_first_seen() {
        let ops = vec![
            op("a", "wo1", 0, "m1", t(8, 0), t(10, 0)),
            op("b", "wo2", 0, "m1", t(9, 0), t(11, 0)),
        ];
        assert_eq!(detect_conflicts(&ops).unwrap(), vec![overlap("a", "b")]);
    }

    #[test]
    fn test_every_overlapping_pair_reported() {
        let ops = vec![
            op("a", "wo1", 0, "m1", t(8, 0), t(12, 0)),
            op("b", "wo2", 0, "m1", t(9, 0), t(10, 0)),
            op("c", "wo3", 0, "m1", t(9, 30), t(11, 0)),
            op("d", "wo4", 0, "m2", t(9, 30), t(11, 0)),
        ];
        assert_eq!(
            detect_conflicts(&ops).unwrap(),
            vec![overlap("a", "b"), overlap("a", "c"), overlap("b", "c")]
        );
    }

    #[test]
    fn test_sequence_violation_keyed_on_later_operation() {
        let ops = vec![
            op("b", "wo1", 1, "m2", t(8, 30), t(9, 30)),
            op("a", "wo1", 0, "m1", t(8, 0), t(9, 0)),
        ];
        assert_eq!(detect_conflicts(&ops).unwrap(), vec![violation("b", "a")]);
    }

    #[test]
    fn test_only_adjacent_indices_checked() {
        // c starts before a ends but after b ends: only the b -> c pair counts.
        let ops = vec![
            op("a", "wo1", 0, "m1", t(8, 0), t(12, 0)),
            op("b", "wo1", 1, "m2", t(7, 0), t(8, 0)),
            op("c", "wo1", 2, "m3", t(9, 0), t(10, 0)),
        ];
        assert_eq!(detect_conflicts(&ops).unwrap(), vec![violation("b", "a")]);
    }

    #[test]
    fn test_overlaps_reported_before_sequence_violations() {
        let ops = vec![
            op("a", "wo1", 0, "m1", t(8, 0), t(10, 0)),
            op("b", "wo1", 1, "m1", t(9, 0), t(11, 0)),
        ];
        assert_eq!(
            detect_conflicts(&ops).unwrap(),
            vec![overlap("a", "b"), violation("b", "a")]
        );
    }

    #[test]
    fn test_inverted_interval_rejected_not_reported_clean() {
        let ops = vec![
            op("a", "wo1", 0, "m1", t(12, 0), t(8, 0)),
            op("b", "wo1", 0, "m1", t(9, 0), t(10, 0)),
        ];
        assert_eq!(
            detect_conflicts(&ops),
            Err(EngineError::NonPositiveDuration("a".to_string()))
        );
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let ops = vec![
            op("a", "wo1", 0, "m1", t(8, 0), t(9, 0)),
            op("b", "wo1", 0, "m2", t(9, 0), t(10, 0)),
        ];
        assert_eq!(
            detect_conflicts(&ops),
            Err(EngineError::DuplicateIndex {
                work_order_id: "wo1".to_string(),
                index: 0
            })
        );
    }

    #[test]
    fn test_missing_index_rejected() {
        let ops = vec![
            op("a", "wo1", 0, "m1", t(8, 0), t(9, 0)),
            op("c", "wo1", 2, "m2", t(9, 0), t(10, 0)),
            op("d", "wo2", 0, "m2", t(11, 0), t(12, 0)),
        ];
        assert_eq!(
            validate_operations(&ops),
            Err(EngineError::MissingIndex {
                work_order_id: "wo1".to_string(),
                index: 1
            })
        );
    }

    #[test]
    fn test_duplicate_operation_id_rejected() {
        let ops = vec![
            op("a", "wo1", 0, "m1", t(8, 0), t(9, 0)),
            op("a", "wo2", 0, "m2", t(9, 0), t(10, 0)),
        ];
        assert_eq!(
            detect_conflicts(&ops),
            Err(EngineError::DuplicateOperation("a".to_string()))
        );
    }

    #[test]
    fn test_conflicted_ids_include_both_sides() {
        let conflicts = vec![overlap("a", "b"), violation("d", "c")];
        let ids = conflicted_operation_ids(&conflicts);
        assert_eq!(ids.len(), 4);
        assert!(has_conflict("b", &conflicts));
        assert!(has_conflict("d", &conflicts));
        assert!(!has_conflict("e", &conflicts));
    }

    fn arbitrary_ops() -> impl Strategy<Value = Vec<Operation>> {
        proptest::collection::vec((0u8..3, 0u8..3, 0i64..600, 1i64..180), 1..10).prop_map(|raw| {
            let base = t(0, 0);
            let mut next_index: FxHashMap<u8, u32> = FxHashMap::default();
            raw.into_iter()
                .enumerate()
                .map(|(i, (wo, machine, start, len))| {
                    let index = next_index.entry(wo).or_insert(0);
                    let op = op(
                        &format!("op{}", i),
                        &format!("wo{}", wo),
                        *index,
                        &format!("m{}", machine),
                        base + Duration::minutes(start),
                        base + Duration::minutes(start + len),
                    );
                    *index += 1;
                    op
                })
                .collect()
        })
    }

    /// Overlap pairs compared without direction, violations exactly.
    fn membership(conflicts: &[ConflictInfo]) -> FxHashSet<(String, String, ConflictKind)> {
        conflicts
            .iter()
            .map(|c| {
                let other = c.conflict_with[0].clone();
                let key = c.operation_id.clone();
                match c.kind {
                    ConflictKind::MachineOverlap if other < key => (other, key, c.kind),
                    _ => (key, other, c.kind),
                }
            })
            .collect()
    }

    proptest! {
        #[test]
        fn shuffling_input_keeps_conflict_set(ops in arbitrary_ops(), rotation in 0usize..10) {
            let mut shuffled = ops.clone();
            shuffled.reverse();
            let len = shuffled.len();
            shuffled.rotate_left(rotation % len);
            prop_assert_eq!(
                membership(&detect_conflicts(&ops).unwrap()),
                membership(&detect_conflicts(&shuffled).unwrap())
            );
        }

        #[test]
        fn generated_schedules_pass_validation(ops in arbitrary_ops()) {
            prop_assert_eq!(validate_operations(&ops), Ok(()));
        }

        #[test]
        fn touching_operations_never_overlap(start in 0i64..600, first in 1i64..120, second in 1i64..120) {
            let base = t(0, 0);
            let split = base + Duration::minutes(start + first);
            let ops = vec![
                op("a", "wo1", 0, "m1", base + Duration::minutes(start), split),
                op("b", "wo2", 0, "m1", split, split + Duration::minutes(second)),
            ];
            prop_assert!(detect_conflicts(&ops).unwrap().is_empty());
        }
    }
}
