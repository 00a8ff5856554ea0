//! Machine occupancy with sorted, non-overlapping busy periods, and the slot search.

use chrono::{DateTime, Duration, Utc};

use crate::error::EngineError;
use crate::models::Operation;
use crate::time::{end_after, saturating_sub};
use crate::{log_checks, log_debug};

/// Which phase of the slot search produced the answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotPhase {
    /// The preferred start was free and inside the bounds.
    Preferred,
    /// First gap at or after the preferred start that fits before the upper bound.
    ForwardGap,
    /// Slot ending exactly where an existing busy period begins.
    BackwardGap,
    /// Nothing fit; the earliest bound is returned as a best effort.
    Fallback,
}

/// Result of a slot search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotChoice {
    pub start: DateTime<Utc>,
    pub phase: SlotPhase,
}

/// Tracks the busy periods of one machine.
///
/// Maintains the invariant that busy_periods is sorted by start and contains no
/// overlapping or touching periods, so ends are sorted too and every lookup can
/// binary search.
#[derive(Clone, Debug)]
pub struct MachineTimeline {
    /// Machine id (for debugging)
    pub machine_id: String,
    /// Sorted list of half-open `[start, end)` busy periods
    pub busy_periods: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

impl MachineTimeline {
    /// Build a timeline from raw busy periods, merging overlapping or touching ones.
    pub fn new(periods: Vec<(DateTime<Utc>, DateTime<Utc>)>, machine_id: String) -> Self {
        Self {
            machine_id,
            busy_periods: Self::merge_periods(periods),
        }
    }

    /// Build the timeline of `machine_id` from every operation bound to it,
    /// skipping `exclude_id` (the operation being moved).
    pub fn from_operations<'a>(
        machine_id: &str,
        operations: impl IntoIterator<Item = &'a Operation>,
        exclude_id: Option<&str>,
    ) -> Result<Self, EngineError> {
        let mut periods = Vec::new();
        for op in operations {
            if op.machine_id != machine_id || exclude_id == Some(op.id.as_str()) {
                continue;
            }
            op.ensure_positive_duration()?;
            periods.push((op.start, op.end));
        }
        Ok(Self::new(periods, machine_id.to_string()))
    }

    fn merge_periods(
        mut periods: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        periods.sort_by_key(|(start, _)| *start);

        let mut merged: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::with_capacity(periods.len());
        for (start, end) in periods {
            match merged.last_mut() {
                Some((_, last_end)) if start <= *last_end => {
                    *last_end = (*last_end).max(end);
                }
                _ => merged.push((start, end)),
            }
        }
        merged
    }

    /// Whether `[start, end)` touches no busy period.
    ///
    /// Uses binary search for O(log n) lookup.
    pub fn is_free(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        // Leftmost period that ends after `start`; only it can overlap.
        let idx = self.busy_periods.partition_point(|(_, busy_end)| *busy_end <= start);
        match self.busy_periods.get(idx) {
            Some((busy_start, _)) => *busy_start >= end,
            None => true,
        }
    }

    /// Find a start for an operation of `duration` that avoids every busy period
    /// and respects `[earliest_start, latest_start]`.
    ///
    /// Phases run in order, each only when the previous found nothing:
    /// 1. keep `preferred_start` if it is free and in bounds
    /// 2. walk forward from `max(earliest_start, preferred_start)` to the first gap
    ///    that fits, while the cursor stays at or before `latest_start`
    /// 3. walk busy periods from latest to earliest and try the slot ending where
    ///    each one begins, provided it starts at or after `earliest_start`
    /// 4. give up and return `earliest_start`
    ///
    /// Every phase is a single pass over the busy periods, so the search always
    /// terminates, degenerate bounds included.
    pub fn search(
        &self,
        preferred_start: DateTime<Utc>,
        duration: Duration,
        earliest_start: DateTime<Utc>,
        latest_start: DateTime<Utc>,
        verbosity: u8,
    ) -> SlotChoice {
        if let Some(start) =
            self.accept_preferred(preferred_start, duration, earliest_start, latest_start)
        {
            log_checks!(verbosity, "  [{}] preferred start {} is free", self.machine_id, start);
            return SlotChoice {
                start,
                phase: SlotPhase::Preferred,
            };
        }

        let cursor = earliest_start.max(preferred_start);

        if let Some(start) = self.forward_gap(cursor, duration, latest_start, verbosity) {
            log_checks!(verbosity, "  [{}] forward scan found gap at {}", self.machine_id, start);
            return SlotChoice {
                start,
                phase: SlotPhase::ForwardGap,
            };
        }

        if let Some(start) = self.backward_gap(duration, earliest_start, verbosity) {
            log_checks!(verbosity, "  [{}] backward scan found gap at {}", self.machine_id, start);
            return SlotChoice {
                start,
                phase: SlotPhase::BackwardGap,
            };
        }

        log_checks!(
            verbosity,
            "  [{}] no slot between {} and {}, falling back to earliest start",
            self.machine_id,
            earliest_start,
            latest_start
        );
        SlotChoice {
            start: earliest_start,
            phase: SlotPhase::Fallback,
        }
    }

    fn accept_preferred(
        &self,
        preferred_start: DateTime<Utc>,
        duration: Duration,
        earliest_start: DateTime<Utc>,
        latest_start: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let preferred_end = end_after(preferred_start, duration)?;
        let in_bounds = preferred_start >= earliest_start && preferred_start <= latest_start;
        (in_bounds && self.is_free(preferred_start, preferred_end)).then_some(preferred_start)
    }

    fn forward_gap(
        &self,
        mut cursor: DateTime<Utc>,
        duration: Duration,
        latest_start: DateTime<Utc>,
        verbosity: u8,
    ) -> Option<DateTime<Utc>> {
        // Periods ending at or before the cursor can neither hold it back nor
        // offer a gap in front of it.
        let first = self.busy_periods.partition_point(|(_, busy_end)| *busy_end <= cursor);

        for &(busy_start, busy_end) in &self.busy_periods[first..] {
            let fits = end_after(cursor, duration).is_some_and(|slot_end| slot_end <= busy_start);
            if fits && cursor <= latest_start {
                return Some(cursor);
            }
            if cursor < busy_end {
                log_debug!(verbosity, "    cursor {} -> {}", cursor, busy_end);
                cursor = busy_end;
            }
        }

        let fits_after_last = end_after(cursor, duration).is_some();
        (fits_after_last && cursor <= latest_start).then_some(cursor)
    }

    fn backward_gap(
        &self,
        duration: Duration,
        earliest_start: DateTime<Utc>,
        verbosity: u8,
    ) -> Option<DateTime<Utc>> {
        for &(busy_start, _) in self.busy_periods.iter().rev() {
            let candidate = saturating_sub(busy_start, duration);
            log_debug!(verbosity, "    candidate {} before {}", candidate, busy_start);
            if candidate >= earliest_start && self.is_free(candidate, busy_start) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Find a start for an operation of `duration` on a machine already running
/// `machine_ops`, within `[earliest_start, latest_start]`.
///
/// See [`MachineTimeline::search`] for the phase order.
pub fn find_slot(
    preferred_start: DateTime<Utc>,
    duration: Duration,
    machine_ops: &[Operation],
    earliest_start: DateTime<Utc>,
    latest_start: DateTime<Utc>,
) -> Result<DateTime<Utc>, EngineError> {
    if duration <= Duration::zero() {
        return Err(EngineError::NonPositiveSlotDuration(duration));
    }
    let mut periods = Vec::with_capacity(machine_ops.len());
    for op in machine_ops {
        op.ensure_positive_duration()?;
        periods.push((op.start, op.end));
    }
    let machine_id = machine_ops
        .first()
        .map(|op| op.machine_id.clone())
        .unwrap_or_default();
    let timeline = MachineTimeline::new(periods, machine_id);
    Ok(timeline
        .search(preferred_start, duration, earliest_start, latest_start, 0)
        .start)
}
