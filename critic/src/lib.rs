//! Critic - independent policy evaluators
//!
//! Provides the capability interface every critic implements and a typed
//! registry the tribunal invokes them through:
//! - Trait-based critics (`Critic`), dispatched dynamically by name
//! - Per-critic metadata: vote weight, mandatory flag, timeout override
//! - Mock and keyword-rule critics for tests and demos
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            CriticRegistry               │
//! │   (name -> critic + CriticMetadata)     │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┼───────────┐
//!      ▼           ▼           ▼
//! ┌─────────┐ ┌─────────┐ ┌─────────┐
//! │ Critic  │ │ Critic  │ │ Critic  │
//! └─────────┘ └─────────┘ └─────────┘
//! ```

pub mod keyword;
pub mod mock;
pub mod registry;
pub mod traits;

// Re-export main types for convenience
pub use keyword::{KeywordCritic, KeywordRule};
pub use mock::MockCritic;
pub use registry::{CriticMetadata, CriticRegistry, RegisteredCritic, RegistryError};
pub use traits::{Critic, CriticError};
