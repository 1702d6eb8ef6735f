//! Step transition rules.
//!
//! Pure functions over the fixed pipeline order:
//!
//! ```text
//! reception -> pre_disinfection -> cleaning -> conditioning
//!   -> sterilization -> control -> storage -> distribution -> (reception)
//! ```
//!
//! The only branch is the control failure on leaving `sterilization`, which
//! sends the box back to `reception` instead of `control`.

use serde::Serialize;

use crate::error::RuleError;
use crate::step::{BoxStatus, Step, ValidationResult};

/// Note recorded on the log entry of a failure-branch restart.
pub const CONTROL_FAILED_NOTE: &str = "control failed: cycle restarted from reception";

/// Step that follows `current`. A box that never started goes to
/// `reception`; `distribution` wraps back to `reception`.
pub fn next_step(current: Option<Step>) -> Step {
    match current {
        None => Step::Reception,
        Some(Step::Reception) => Step::PreDisinfection,
        Some(Step::PreDisinfection) => Step::Cleaning,
        Some(Step::Cleaning) => Step::Conditioning,
        Some(Step::Conditioning) => Step::Sterilization,
        Some(Step::Sterilization) => Step::Control,
        Some(Step::Control) => Step::Storage,
        Some(Step::Storage) => Step::Distribution,
        Some(Step::Distribution) => Step::Reception,
    }
}

/// Status displayed for a box sitting at `step`.
pub fn status_for_step(step: Step) -> BoxStatus {
    match step {
        Step::Reception => BoxStatus::Dirty,
        Step::PreDisinfection | Step::Cleaning => BoxStatus::Cleaning,
        Step::Conditioning => BoxStatus::ReadyForSterilization,
        Step::Sterilization => BoxStatus::Sterilizing,
        Step::Control | Step::Storage => BoxStatus::Sterile,
        Step::Distribution => BoxStatus::InUse,
    }
}

/// Status of a box that may not have started the cycle yet.
pub fn status_for(step: Option<Step>) -> BoxStatus {
    step.map_or(BoxStatus::Dirty, status_for_step)
}

/// Whether leaving `step` needs a control result.
pub fn requires_validation(step: Option<Step>) -> bool {
    step == Some(Step::Sterilization)
}

/// Fully resolved transition for one advance of a box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionPlan {
    pub from: Option<Step>,
    pub to: Step,
    /// Control result to record; only set when leaving sterilization.
    pub validation_result: Option<ValidationResult>,
    /// The box's assigned service and bloc must be cleared.
    pub clears_assignment: bool,
    /// Entering storage: the sterilization timestamps must be refreshed.
    pub marks_sterilized: bool,
    /// Synthetic note explaining an out-of-order restart.
    pub restart_reason: Option<&'static str>,
}

impl TransitionPlan {
    pub fn to_status(&self) -> BoxStatus {
        status_for_step(self.to)
    }

    /// True when the box is sent back to reception by this transition.
    pub fn is_restart(&self) -> bool {
        self.to == Step::Reception && self.from.is_some()
    }
}

/// Plan the advance of a box currently at `current`.
///
/// A control result supplied for any step other than `sterilization` is not
/// part of the plan. Leaving `distribution` is a return from use and clears
/// the assignment.
pub fn plan_transition(
    current: Option<Step>,
    validation_result: Option<ValidationResult>,
) -> Result<TransitionPlan, RuleError> {
    if requires_validation(current) {
        return match validation_result {
            None => Err(RuleError::ValidationRequired {
                step: Step::Sterilization,
            }),
            Some(ValidationResult::Passed) => Ok(TransitionPlan {
                from: current,
                to: Step::Control,
                validation_result: Some(ValidationResult::Passed),
                clears_assignment: false,
                marks_sterilized: false,
                restart_reason: None,
            }),
            Some(ValidationResult::Failed) => Ok(TransitionPlan {
                from: current,
                to: Step::Reception,
                validation_result: Some(ValidationResult::Failed),
                clears_assignment: true,
                marks_sterilized: false,
                restart_reason: Some(CONTROL_FAILED_NOTE),
            }),
        };
    }

    let to = next_step(current);
    Ok(TransitionPlan {
        from: current,
        to,
        validation_result: None,
        clears_assignment: current == Some(Step::Distribution),
        marks_sterilized: to == Step::Storage,
        restart_reason: None,
    })
}

/// Plan an unconditional return to reception from wherever the box is.
pub fn plan_reset(current: Option<Step>) -> TransitionPlan {
    TransitionPlan {
        from: current,
        to: Step::Reception,
        validation_result: None,
        clears_assignment: true,
        marks_sterilized: false,
        restart_reason: None,
    }
}
