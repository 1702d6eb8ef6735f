//! Steriflow engine -- drives instrument boxes through the sterilization
//! cycle on top of a `WorkflowStorage` backend.
//!
//! Every mutating operation runs in one storage snapshot: the box update,
//! its log entry and any assignment change become visible together or not
//! at all.

pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod workflow;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::WorkflowConfig;
pub use error::WorkflowError;
pub use identity::{IdentityContext, StaticIdentity};
pub use workflow::{
    AdvanceOutcome, AdvanceRequest, HistoryEntry, ReturnOutcome, Workflow, UNKNOWN_ACTOR,
};
