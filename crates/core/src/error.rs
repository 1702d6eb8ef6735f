use crate::step::Step;

/// Errors raised by the pure workflow rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// Leaving a step that requires a control result without providing one.
    #[error("a control result (passed/failed) is required to leave the {step} step")]
    ValidationRequired { step: Step },

    /// A scanned or typed box code was blank.
    #[error("box code must not be empty")]
    EmptyBoxCode,

    /// A textual value did not name any known variant.
    #[error("unknown {kind}: '{value}'")]
    UnknownValue { kind: &'static str, value: String },
}
