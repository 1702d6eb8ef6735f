//! Storage layer for the sterilization workflow.
//!
//! [`WorkflowStorage`] is the transactional seam the engine writes through.
//! [`MemoryStorage`] implements it in process, optionally persisted to a JSON
//! file. [`conformance`] holds the suite every backend must pass.

pub mod conformance;
mod error;
mod memory;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStorage};
pub use traits::WorkflowStorage;
