//! Configuration types for the placement engine.

use chrono::Duration;
use pyo3::prelude::*;

/// Configuration for placement validation and slot search.
#[pyclass]
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Verbosity level: 0=silent, 1=verdicts, 2=checks, 3=debug.
    #[pyo3(get, set)]
    pub verbosity: u8,
    /// How far past `now` the slot search may go when the operation has no successor.
    #[pyo3(get, set)]
    pub search_horizon_days: i64,
    /// Grid (in minutes) a dropped start time is snapped to before validation.
    #[pyo3(get, set)]
    pub snap_minutes: u32,
    /// Treat a missing work order as invalid input instead of accepting the placement.
    #[pyo3(get, set)]
    pub require_work_order: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            search_horizon_days: 365,
            snap_minutes: 15,
            require_work_order: false,
        }
    }
}

impl EngineConfig {
    /// Open-ended upper bound for the slot search, as a duration past `now`.
    pub fn search_horizon(&self) -> Duration {
        Duration::try_days(self.search_horizon_days.max(0)).unwrap_or(Duration::MAX)
    }
}

#[pymethods]
impl EngineConfig {
    #[new]
    #[pyo3(signature = (
        verbosity=None,
        search_horizon_days=None,
        snap_minutes=None,
        require_work_order=None
    ))]
    fn new(
        verbosity: Option<u8>,
        search_horizon_days: Option<i64>,
        snap_minutes: Option<u32>,
        require_work_order: Option<bool>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            search_horizon_days: search_horizon_days.unwrap_or(defaults.search_horizon_days),
            snap_minutes: snap_minutes.unwrap_or(defaults.snap_minutes),
            require_work_order: require_work_order.unwrap_or(defaults.require_work_order),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "EngineConfig(verbosity={}, search_horizon_days={}, snap_minutes={}, require_work_order={})",
            self.verbosity, self.search_horizon_days, self.snap_minutes, self.require_work_order
        )
    }
}
