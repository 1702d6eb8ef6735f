//! Steriflow core -- the vocabulary and rules of the instrument sterilization
//! cycle.
//!
//! Everything here is pure: no I/O, no clocks. The engine crate combines
//! these rules with a `WorkflowStorage` backend.

pub mod error;
pub mod model;
pub mod rules;
pub mod step;

pub use error::RuleError;
pub use model::{
    AssignmentStatus, BoxAssignment, BoxCode, BoxView, InstrumentBox, Profile, WorkflowLogEntry,
};
pub use rules::{
    next_step, plan_reset, plan_transition, requires_validation, status_for, status_for_step,
    TransitionPlan, CONTROL_FAILED_NOTE,
};
pub use step::{BoxStatus, Step, SterilizationType, ValidationResult};
