//! Records persisted by a workflow store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::RuleError;
use crate::rules::status_for;
use crate::step::{BoxStatus, Step, SterilizationType, ValidationResult};

/// Canonical form of a scanned or typed box code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoxCode(String);

impl BoxCode {
    /// Trim and uppercase a raw code. Blank input is rejected.
    pub fn normalize(raw: &str) -> Result<Self, RuleError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RuleError::EmptyBoxCode);
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoxCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A box of surgical instruments tracked through the cycle.
///
/// The display status is not stored: it is always derived from
/// `current_step` (see [`InstrumentBox::status`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentBox {
    pub id: String,
    pub code: BoxCode,
    pub name: String,
    /// `None` until the box first enters reception.
    pub current_step: Option<Step>,
    pub sterilization_type: Option<SterilizationType>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_sterilized_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub next_sterilization_due: Option<OffsetDateTime>,
    pub assigned_service_id: Option<String>,
    pub assigned_bloc: Option<String>,
    pub active: bool,
    /// Optimistic concurrency counter, bumped on every persisted update.
    pub version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl InstrumentBox {
    /// A freshly registered, not yet started box.
    pub fn new(
        id: String,
        code: BoxCode,
        name: String,
        sterilization_type: Option<SterilizationType>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            code,
            name,
            current_step: None,
            sterilization_type,
            last_sterilized_at: None,
            next_sterilization_due: None,
            assigned_service_id: None,
            assigned_bloc: None,
            active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> BoxStatus {
        status_for(self.current_step)
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_service_id.is_some()
    }

    pub fn clear_assignment(&mut self) {
        self.assigned_service_id = None;
        self.assigned_bloc = None;
    }
}

/// Outward representation of a box, carrying the derived status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxView {
    pub id: String,
    pub code: BoxCode,
    pub name: String,
    pub current_step: Option<Step>,
    pub status: BoxStatus,
    pub sterilization_type: Option<SterilizationType>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sterilized_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_sterilization_due: Option<OffsetDateTime>,
    pub assigned_service_id: Option<String>,
    pub assigned_bloc: Option<String>,
    pub active: bool,
    pub version: u64,
}

impl From<&InstrumentBox> for BoxView {
    fn from(b: &InstrumentBox) -> Self {
        Self {
            id: b.id.clone(),
            code: b.code.clone(),
            name: b.name.clone(),
            current_step: b.current_step,
            status: b.status(),
            sterilization_type: b.sterilization_type,
            last_sterilized_at: b.last_sterilized_at,
            next_sterilization_due: b.next_sterilization_due,
            assigned_service_id: b.assigned_service_id.clone(),
            assigned_bloc: b.assigned_bloc.clone(),
            active: b.active,
            version: b.version,
        }
    }
}

/// Immutable audit record of one box transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowLogEntry {
    pub id: String,
    pub box_id: String,
    /// `None` only for the very first transition of a box.
    pub from_step: Option<Step>,
    pub to_step: Step,
    pub performed_by: String,
    pub sterilization_type: Option<SterilizationType>,
    pub validation_result: Option<ValidationResult>,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Assigned by the store on append; breaks ties between equal timestamps.
    #[serde(default)]
    pub sequence: u64,
}

/// Lifecycle of a box allocation to a requesting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Requested,
    Assigned,
    InUse,
    Returned,
}

impl AssignmentStatus {
    /// Open assignments hold the box; only `returned` releases it.
    pub fn is_open(self) -> bool {
        !matches!(self, AssignmentStatus::Returned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Requested => "requested",
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::InUse => "in_use",
            AssignmentStatus::Returned => "returned",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "requested" => Ok(AssignmentStatus::Requested),
            "assigned" => Ok(AssignmentStatus::Assigned),
            "in_use" => Ok(AssignmentStatus::InUse),
            "returned" => Ok(AssignmentStatus::Returned),
            _ => Err(RuleError::UnknownValue {
                kind: "assignment status",
                value: s.to_string(),
            }),
        }
    }
}

/// Allocation of a sterile box to a requesting service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxAssignment {
    pub id: String,
    pub box_id: String,
    pub service_id: String,
    /// Sub-location inside the service (operating block, room).
    pub bloc: Option<String>,
    pub status: AssignmentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub assigned_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub in_use_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub returned_at: Option<OffsetDateTime>,
    pub requested_by: String,
    pub assigned_by: Option<String>,
    pub returned_by: Option<String>,
}

/// Display name of an actor, used by history views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub actor_id: String,
    pub full_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn box_code_is_trimmed_and_uppercased() {
        let code = BoxCode::normalize("  ortho-12a \n").unwrap();
        assert_eq!(code.as_str(), "ORTHO-12A");
    }

    #[test]
    fn blank_box_code_is_rejected() {
        assert_eq!(BoxCode::normalize("   "), Err(RuleError::EmptyBoxCode));
    }

    #[test]
    fn status_is_derived_from_step() {
        let mut b = InstrumentBox::new(
            "b1".to_string(),
            BoxCode::normalize("box-1").unwrap(),
            "Laparoscopy set".to_string(),
            None,
            datetime!(2026-03-01 08:00 UTC),
        );
        assert_eq!(b.status(), BoxStatus::Dirty);
        b.current_step = Some(Step::Storage);
        assert_eq!(b.status(), BoxStatus::Sterile);
        assert_eq!(BoxView::from(&b).status, BoxStatus::Sterile);
    }

    #[test]
    fn box_round_trips_through_json_with_rfc3339_timestamps() {
        let mut b = InstrumentBox::new(
            "b1".to_string(),
            BoxCode::normalize("box-1").unwrap(),
            "Laparoscopy set".to_string(),
            Some(SterilizationType::Steam),
            datetime!(2026-03-01 08:00 UTC),
        );
        b.last_sterilized_at = Some(datetime!(2026-03-02 10:30 UTC));
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["code"], "BOX-1");
        assert_eq!(json["last_sterilized_at"], "2026-03-02T10:30:00Z");
        let back: InstrumentBox = serde_json::from_value(json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn only_returned_assignments_are_closed() {
        assert!(AssignmentStatus::Requested.is_open());
        assert!(AssignmentStatus::Assigned.is_open());
        assert!(AssignmentStatus::InUse.is_open());
        assert!(!AssignmentStatus::Returned.is_open());
        assert_eq!("in-use".parse::<AssignmentStatus>().unwrap(), AssignmentStatus::InUse);
    }
}
