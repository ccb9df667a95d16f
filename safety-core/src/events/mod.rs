//! Safety events
//!
//! The pipeline publishes what it decided so downstream workflows (coach
//! notification, clinical handoff, failure review) can react without being
//! wired into the classification path.

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventFilter, SharedEventBus};
pub use types::SafetyEvent;
