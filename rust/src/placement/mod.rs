//! Placement of a single operation: validation, slot search and commit checks.
//!
//! The validator answers "may this operation start here, and if not, where?"
//! during an interactive reschedule. The commit check answers "may this exact
//! interval be written?" right before persistence.

mod commit;
mod machine_timeline;
mod validator;

pub use commit::{check_update, CommitVerdict, RuleViolation};
pub use machine_timeline::{find_slot, MachineTimeline, SlotChoice, SlotPhase};
pub use validator::{validate_placement, PlacementVerdict, RejectionReason};
