//! Typed registry of critics keyed by name.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::traits::Critic;

/// Error types for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A critic with this name is already registered
    #[error("Critic already registered: {0}")]
    Duplicate(String),

    /// Critic name is empty
    #[error("Critic name must not be empty")]
    EmptyName,

    /// Weight is negative or not finite
    #[error("Invalid weight for critic {name}: {weight}")]
    InvalidWeight { name: String, weight: f64 },

    /// No critic with this name
    #[error("Critic not found: {0}")]
    NotFound(String),
}

/// Metadata about a registered critic.
#[derive(Debug, Clone)]
pub struct CriticMetadata {
    /// Vote weight multiplier
    pub weight: f64,
    /// Whether a failure of this critic is critical
    pub mandatory: bool,
    /// Whether the critic is invoked
    pub enabled: bool,
    /// Custom timeout override (ms)
    pub timeout_ms: Option<u64>,
}

impl Default for CriticMetadata {
    fn default() -> Self {
        Self {
            weight: 1.0,
            mandatory: false,
            enabled: true,
            timeout_ms: None,
        }
    }
}

impl CriticMetadata {
    /// Metadata for a mandatory critic.
    pub fn mandatory() -> Self {
        Self {
            mandatory: true,
            ..Default::default()
        }
    }

    /// Set the weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the timeout override.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// A critic with its metadata, as handed to the collector.
#[derive(Clone)]
pub struct RegisteredCritic {
    /// The critic
    pub critic: Arc<dyn Critic>,
    /// Its metadata
    pub metadata: CriticMetadata,
}

impl RegisteredCritic {
    /// Critic name.
    pub fn name(&self) -> &str {
        self.critic.name()
    }
}

/// Registry of critics, ordered by name.
pub struct CriticRegistry {
    critics: Arc<RwLock<BTreeMap<String, RegisteredCritic>>>,
}

impl CriticRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            critics: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Register a critic.
    pub async fn register(
        &self,
        critic: Arc<dyn Critic>,
        metadata: CriticMetadata,
    ) -> Result<(), RegistryError> {
        let name = critic.name().to_string();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if !metadata.weight.is_finite() || metadata.weight < 0.0 {
            return Err(RegistryError::InvalidWeight {
                name,
                weight: metadata.weight,
            });
        }

        let mut critics = self.critics.write().await;
        if critics.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        tracing::debug!(critic = %name, weight = metadata.weight, mandatory = metadata.mandatory, "Critic registered");
        critics.insert(name, RegisteredCritic { critic, metadata });
        Ok(())
    }

    /// Check if a critic is registered.
    pub async fn has(&self, name: &str) -> bool {
        self.critics.read().await.contains_key(name)
    }

    /// Enabled critics, ordered by name.
    pub async fn enabled(&self) -> Vec<RegisteredCritic> {
        let critics = self.critics.read().await;
        critics
            .values()
            .filter(|c| c.metadata.enabled)
            .cloned()
            .collect()
    }

    /// Names of all registered critics, ordered.
    pub async fn names(&self) -> Vec<String> {
        self.critics.read().await.keys().cloned().collect()
    }

    /// Configured weights by critic name.
    pub async fn weights(&self) -> BTreeMap<String, f64> {
        let critics = self.critics.read().await;
        critics
            .iter()
            .map(|(name, c)| (name.clone(), c.metadata.weight))
            .collect()
    }

    /// Names of mandatory critics.
    pub async fn mandatory(&self) -> BTreeSet<String> {
        let critics = self.critics.read().await;
        critics
            .iter()
            .filter(|(_, c)| c.metadata.mandatory)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Enable or disable a critic.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let mut critics = self.critics.write().await;
        let entry = critics
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        entry.metadata.enabled = enabled;
        Ok(())
    }

    /// Override a critic's weight.
    pub async fn set_weight(&self, name: &str, weight: f64) -> Result<(), RegistryError> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(RegistryError::InvalidWeight {
                name: name.to_string(),
                weight,
            });
        }
        let mut critics = self.critics.write().await;
        let entry = critics
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        entry.metadata.weight = weight;
        Ok(())
    }

    /// Number of registered critics.
    pub async fn len(&self) -> usize {
        self.critics.read().await.len()
    }

    /// Whether no critics are registered.
    pub async fn is_empty(&self) -> bool {
        self.critics.read().await.is_empty()
    }
}

impl Default for CriticRegistry {
    fn default() -> Self {
        Self::new()
    }
}
