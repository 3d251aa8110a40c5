//! Evidence model for the critic tribunal.
//!
//! This crate holds the records that flow through the decision pipeline:
//!
//! - **Case input**: the proposed action under review and its snapshot
//! - **Evidence bundles**: one immutable record per critic evaluation
//! - **Decisions**: the governed verdict reduced from a bundle set
//! - **Precedents**: finalized decisions retained for consistency checks
//!
//! # Key Components
//!
//! - [`EvidenceBundle`]: A critic's verdict, confidence and justification
//! - [`Decision`]: Aggregated verdict with dissent measure
//! - [`PrecedentStore`]: Trait for similarity search over past decisions
//! - [`InMemoryPrecedentStore`]: Lock-guarded in-process implementation
//!
//! Schemas are semantically versioned. Decoders keep unknown fields in an
//! `extra` map instead of rejecting them.

pub mod decision;
pub mod embedding;
pub mod hash;
pub mod precedent;
pub mod types;

// Re-export main types
pub use decision::{Decision, DecisionStatus, DisagreementType, EscalationTrigger};
pub use embedding::HashingEmbedder;
pub use hash::{content_hash, sha256_hex};
pub use precedent::{
    InMemoryPrecedentStore, Precedent, PrecedentDecision, PrecedentError, PrecedentMatch,
    PrecedentQuery, PrecedentStore, SearchMode,
};
pub use types::*;
