//! Escalation: tiers, classification results, normalization, and incident records
//!
//! # Tier Ladder
//!
//! ```text
//! Tier 0  None          no action
//!     │
//! Tier 1  MonitorOnly   no incident; escalates only if the classifier says so
//!     │                 (or confidence > 0.8 at the call site)
//!     │
//! Tier 2  ElevatedRisk  always escalates → EscalationRecord (consent pending)
//!     │
//! Tier 3  CriticalRisk  always escalates → EscalationRecord (consent not required)
//!                       conversation enters safety mode
//! ```
//!
//! Everything here is deterministic; the only probabilistic input is the raw
//! classifier JSON handed to [`ResultNormalizer`].

pub mod normalizer;
pub mod record;
pub mod result;
pub mod tier;

pub use normalizer::{extract_json_object, Adjustment, Normalized, ResultNormalizer};
pub use record::{ConsentStatus, EscalationRecord, HandoffStatus, RecordId, RecordStatus};
pub use result::{ClassificationResult, DEFAULT_CATEGORY, DEFAULT_CONFIDENCE};
pub use tier::{InvalidTier, RiskTier};
