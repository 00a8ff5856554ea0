//! Verbosity-gated diagnostics for placement decisions, written to stderr.
//!
//! The level comes from `EngineConfig::verbosity`; at 0 the macros compile to
//! a single comparison and their format arguments are never evaluated.
//!
//! | Level | Constant             | Who logs what |
//! |-------|----------------------|---------------|
//! | 0     | `VERBOSITY_SILENT`   | nothing |
//! | 1     | `VERBOSITY_VERDICTS` | validator: each rejection with its reason and corrected start |
//! | 2     | `VERBOSITY_CHECKS`   | validator: the request and every accepted rule; timeline: which slot phase answered; snapshot: drop snapping |
//! | 3     | `VERBOSITY_DEBUG`    | timeline: forward cursor jumps and backward candidates, one line per busy period |
//!
//! Indentation follows call depth: a request line is flush left, rule and
//! phase outcomes are indented two spaces, scan internals four. Machine
//! scoped lines carry the machine id in brackets, e.g. `[m1]`.

pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_VERDICTS: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Rejections and the corrected start the validator hands back.
#[macro_export]
macro_rules! log_verdicts {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_VERDICTS {
            eprintln!($($arg)*);
        }
    };
}

/// Per-rule outcomes, the slot phase that produced a start, and grid snapping.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            eprintln!($($arg)*);
        }
    };
}

/// Busy-period walk of the forward and backward gap scans.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            eprintln!($($arg)*);
        }
    };
}
