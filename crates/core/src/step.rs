//! Workflow vocabulary: steps, statuses, control results and sterilization
//! methods.
//!
//! Every enum serializes to (and parses from) its snake_case name, which is
//! the form used in the store file, the HTTP API and the CLI.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// One of the eight stages of the sterilization cycle, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Reception,
    PreDisinfection,
    Cleaning,
    Conditioning,
    Sterilization,
    Control,
    Storage,
    Distribution,
}

impl Step {
    /// All steps in pipeline order.
    pub const ALL: [Step; 8] = [
        Step::Reception,
        Step::PreDisinfection,
        Step::Cleaning,
        Step::Conditioning,
        Step::Sterilization,
        Step::Control,
        Step::Storage,
        Step::Distribution,
    ];

    /// 1-based position of the step in the pipeline.
    pub fn ordinal(self) -> u8 {
        match self {
            Step::Reception => 1,
            Step::PreDisinfection => 2,
            Step::Cleaning => 3,
            Step::Conditioning => 4,
            Step::Sterilization => 5,
            Step::Control => 6,
            Step::Storage => 7,
            Step::Distribution => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Reception => "reception",
            Step::PreDisinfection => "pre_disinfection",
            Step::Cleaning => "cleaning",
            Step::Conditioning => "conditioning",
            Step::Sterilization => "sterilization",
            Step::Control => "control",
            Step::Storage => "storage",
            Step::Distribution => "distribution",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Step::ALL
            .into_iter()
            .find(|step| step.as_str() == wanted)
            .ok_or_else(|| RuleError::UnknownValue {
                kind: "step",
                value: s.to_string(),
            })
    }
}

/// Display status of a box, derived from its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxStatus {
    Dirty,
    Cleaning,
    ReadyForSterilization,
    Sterilizing,
    Sterile,
    InUse,
}

impl BoxStatus {
    pub const ALL: [BoxStatus; 6] = [
        BoxStatus::Dirty,
        BoxStatus::Cleaning,
        BoxStatus::ReadyForSterilization,
        BoxStatus::Sterilizing,
        BoxStatus::Sterile,
        BoxStatus::InUse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BoxStatus::Dirty => "dirty",
            BoxStatus::Cleaning => "cleaning",
            BoxStatus::ReadyForSterilization => "ready_for_sterilization",
            BoxStatus::Sterilizing => "sterilizing",
            BoxStatus::Sterile => "sterile",
            BoxStatus::InUse => "in_use",
        }
    }
}

impl fmt::Display for BoxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoxStatus {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        BoxStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| RuleError::UnknownValue {
                kind: "status",
                value: s.to_string(),
            })
    }
}

/// Outcome of the biological/chemical control performed on leaving the
/// sterilization step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationResult {
    Passed,
    Failed,
}

impl ValidationResult {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationResult::Passed => "passed",
            ValidationResult::Failed => "failed",
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationResult {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passed" | "pass" => Ok(ValidationResult::Passed),
            "failed" | "fail" => Ok(ValidationResult::Failed),
            _ => Err(RuleError::UnknownValue {
                kind: "validation result",
                value: s.to_string(),
            }),
        }
    }
}

/// Sterilization method applied to a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SterilizationType {
    /// Saturated steam autoclave.
    Steam,
    LowTemperaturePlasma,
    EthyleneOxide,
    DryHeat,
    Formaldehyde,
}

impl SterilizationType {
    pub const ALL: [SterilizationType; 5] = [
        SterilizationType::Steam,
        SterilizationType::LowTemperaturePlasma,
        SterilizationType::EthyleneOxide,
        SterilizationType::DryHeat,
        SterilizationType::Formaldehyde,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SterilizationType::Steam => "steam",
            SterilizationType::LowTemperaturePlasma => "low_temperature_plasma",
            SterilizationType::EthyleneOxide => "ethylene_oxide",
            SterilizationType::DryHeat => "dry_heat",
            SterilizationType::Formaldehyde => "formaldehyde",
        }
    }
}

impl fmt::Display for SterilizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SterilizationType {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        SterilizationType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| RuleError::UnknownValue {
                kind: "sterilization type",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_names_round_trip_through_from_str() {
        for step in Step::ALL {
            assert_eq!(step.as_str().parse::<Step>().unwrap(), step);
        }
    }

    #[test]
    fn step_parsing_accepts_dashes_and_case() {
        assert_eq!(
            "Pre-Disinfection".parse::<Step>().unwrap(),
            Step::PreDisinfection
        );
        assert!(matches!(
            "autoclave".parse::<Step>(),
            Err(RuleError::UnknownValue { kind: "step", .. })
        ));
    }

    #[test]
    fn ordinals_follow_pipeline_order() {
        let ordinals: Vec<u8> = Step::ALL.iter().map(|s| s.ordinal()).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&BoxStatus::ReadyForSterilization).unwrap();
        assert_eq!(json, "\"ready_for_sterilization\"");
        let step: Step = serde_json::from_str("\"pre_disinfection\"").unwrap();
        assert_eq!(step, Step::PreDisinfection);
    }

    #[test]
    fn validation_result_accepts_short_forms() {
        assert_eq!("PASS".parse::<ValidationResult>().unwrap(), ValidationResult::Passed);
        assert_eq!("failed".parse::<ValidationResult>().unwrap(), ValidationResult::Failed);
        assert!("maybe".parse::<ValidationResult>().is_err());
    }

    #[test]
    fn sterilization_type_accepts_spaces() {
        assert_eq!(
            "Low temperature plasma".parse::<SterilizationType>().unwrap(),
            SterilizationType::LowTemperaturePlasma
        );
    }
}
