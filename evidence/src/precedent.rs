//! Precedent storage and similarity search.
//!
//! A precedent is a finalized decision retained for consistency checking.
//! The [`PrecedentStore`] trait is the seam to whatever engine backs the
//! store; [`InMemoryPrecedentStore`] is the in-process implementation.
//!
//! Concurrency contract: reads run concurrently, writes are serialized and
//! keyed by the case content hash.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::decision::Decision;
use crate::embedding::{cosine_similarity, HashingEmbedder};
use crate::types::{InputSnapshot, Verdict};

/// Error types for precedent operations.
#[derive(Debug, thiserror::Error)]
pub enum PrecedentError {
    /// Store is not reachable
    #[error("Precedent store unavailable: {0}")]
    Unavailable(String),

    /// Precedent not found
    #[error("Precedent not found: {0}")]
    NotFound(String),

    /// Invalid precedent data
    #[error("Invalid precedent: {0}")]
    InvalidPrecedent(String),
}

/// Search strategy for precedent lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Content-hash equality only
    Exact,
    /// Embedding similarity
    Semantic,
    /// Exact match first, then blended semantic and lexical similarity
    #[default]
    Hybrid,
}

/// The recorded outcome of a precedent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecedentDecision {
    /// Case that produced the precedent
    pub case_id: String,
    /// Verdict on record
    pub final_verdict: Verdict,
    /// Confidence on record
    pub confidence: f64,
}

/// A stored precedent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precedent {
    /// Unique precedent ID
    pub precedent_id: String,
    /// Content hash of the input
    pub case_hash: String,
    /// Input snapshot
    pub input_snapshot: InputSnapshot,
    /// Recorded outcome
    pub decision: PrecedentDecision,
    /// Short case summary
    pub case_summary: String,
    /// Embedding vector, attached lazily
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// When the precedent was created
    pub created_at: DateTime<Utc>,
}

impl Precedent {
    /// Create a precedent from an input snapshot and outcome.
    pub fn new(snapshot: InputSnapshot, final_verdict: Verdict, confidence: f64) -> Self {
        Self {
            precedent_id: uuid::Uuid::new_v4().to_string(),
            case_hash: snapshot.content_hash.clone(),
            case_summary: snapshot.summary(),
            decision: PrecedentDecision {
                case_id: snapshot.case_id.clone(),
                final_verdict,
                confidence,
            },
            input_snapshot: snapshot,
            embedding: None,
            created_at: Utc::now(),
        }
    }

    /// Promote a finalized decision to a precedent.
    pub fn from_decision(decision: &Decision) -> Result<Self, PrecedentError> {
        let snapshot = decision.input_snapshot().cloned().ok_or_else(|| {
            PrecedentError::InvalidPrecedent(format!(
                "Decision {} has no evidence to snapshot",
                decision.case_id
            ))
        })?;

        if decision.is_undecidable() {
            return Err(PrecedentError::InvalidPrecedent(format!(
                "Decision {} is undecidable",
                decision.case_id
            )));
        }

        Ok(Self::new(snapshot, decision.final_verdict, decision.confidence))
    }

    /// Attach an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// A precedent search request.
#[derive(Debug, Clone)]
pub struct PrecedentQuery {
    /// Snapshot of the case being decided
    pub snapshot: InputSnapshot,
    /// Maximum matches to return
    pub top_k: usize,
    /// Minimum similarity for a match
    pub min_similarity: f64,
    /// Search strategy
    pub mode: SearchMode,
}

impl PrecedentQuery {
    /// Create a hybrid query.
    pub fn new(snapshot: InputSnapshot, top_k: usize, min_similarity: f64) -> Self {
        Self {
            snapshot,
            top_k,
            min_similarity,
            mode: SearchMode::Hybrid,
        }
    }

    /// Set the search mode.
    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecedentMatch {
    /// Matched precedent ID
    pub precedent_id: String,
    /// Similarity score (0.0 - 1.0)
    pub similarity_score: f64,
    /// Recorded outcome
    pub decision: PrecedentDecision,
    /// Case summary
    pub case_summary: String,
}

/// Trait for precedent storage backends.
///
/// Implementations must allow concurrent reads and serialize writes.
/// Results must be ranked by similarity descending with a deterministic
/// tie-break so that identical snapshots yield identical rankings.
#[async_trait]
pub trait PrecedentStore: Send + Sync {
    /// Ranked similarity search.
    async fn search_hybrid(&self, query: &PrecedentQuery) -> Result<Vec<PrecedentMatch>, PrecedentError>;

    /// Append a precedent, returning its ID.
    async fn append(&self, precedent: Precedent) -> Result<String, PrecedentError>;

    /// Attach an embedding to a stored precedent.
    async fn attach_embedding(&self, precedent_id: &str, embedding: Vec<f32>) -> Result<(), PrecedentError>;

    /// Get a precedent by ID.
    async fn get(&self, precedent_id: &str) -> Result<Precedent, PrecedentError>;

    /// Check if the store is reachable.
    async fn is_available(&self) -> bool;
}

#[derive(Default)]
struct StoreState {
    /// Precedents by ID
    precedents: BTreeMap<String, Precedent>,
    /// Case hash to precedent ID
    by_case_hash: HashMap<String, String>,
}

/// In-memory precedent store.
pub struct InMemoryPrecedentStore {
    state: Arc<RwLock<StoreState>>,
    embedder: Option<HashingEmbedder>,
    available: AtomicBool,
}

impl InMemoryPrecedentStore {
    /// Create a new empty store without embeddings.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            embedder: None,
            available: AtomicBool::new(true),
        }
    }

    /// Use an embedder for semantic search. Appended precedents without an
    /// embedding are embedded on insert.
    pub fn with_embedder(mut self, embedder: HashingEmbedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Simulate an outage.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored precedents.
    pub async fn count(&self) -> usize {
        self.state.read().await.precedents.len()
    }

    fn ensure_available(&self) -> Result<(), PrecedentError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PrecedentError::Unavailable("in-memory store disabled".to_string()))
        }
    }

    fn lexical_similarity(a: &InputSnapshot, b: &InputSnapshot) -> f64 {
        let ta = a.tokens();
        let tb = b.tokens();
        if ta.is_empty() && tb.is_empty() {
            return 0.0;
        }
        let intersection = ta.intersection(&tb).count() as f64;
        let union = ta.union(&tb).count() as f64;
        intersection / union
    }

    fn semantic_similarity(
        &self,
        query_embedding: Option<&[f32]>,
        query: &InputSnapshot,
        precedent: &Precedent,
    ) -> f64 {
        match (query_embedding, precedent.embedding.as_deref()) {
            (Some(q), Some(p)) => cosine_similarity(q, p),
            _ => Self::lexical_similarity(query, &precedent.input_snapshot),
        }
    }

    fn score(
        &self,
        query: &PrecedentQuery,
        query_embedding: Option<&[f32]>,
        precedent: &Precedent,
    ) -> f64 {
        let exact = precedent.case_hash == query.snapshot.content_hash;
        match query.mode {
            SearchMode::Exact => {
                if exact {
                    1.0
                } else {
                    0.0
                }
            }
            SearchMode::Semantic => self.semantic_similarity(query_embedding, &query.snapshot, precedent),
            SearchMode::Hybrid => {
                if exact {
                    1.0
                } else {
                    let semantic = self.semantic_similarity(query_embedding, &query.snapshot, precedent);
                    let lexical = Self::lexical_similarity(&query.snapshot, &precedent.input_snapshot);
                    0.6 * semantic + 0.4 * lexical
                }
            }
        }
    }
}

impl Default for InMemoryPrecedentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrecedentStore for InMemoryPrecedentStore {
    async fn search_hybrid(&self, query: &PrecedentQuery) -> Result<Vec<PrecedentMatch>, PrecedentError> {
        self.ensure_available()?;

        let query_embedding = self
            .embedder
            .as_ref()
            .map(|e| e.embed(&query.snapshot.prompt));

        let state = self.state.read().await;
        let mut matches: Vec<PrecedentMatch> = state
            .precedents
            .values()
            .filter_map(|p| {
                let similarity = self.score(query, query_embedding.as_deref(), p);
                if similarity >= query.min_similarity && similarity > 0.0 {
                    Some(PrecedentMatch {
                        precedent_id: p.precedent_id.clone(),
                        similarity_score: similarity,
                        decision: p.decision.clone(),
                        case_summary: p.case_summary.clone(),
                    })
                } else {
                    None
                }
            })
            .collect();

        // Similarity descending, ID ascending for ties
        matches.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.precedent_id.cmp(&b.precedent_id))
        });
        matches.truncate(query.top_k);

        Ok(matches)
    }

    async fn append(&self, mut precedent: Precedent) -> Result<String, PrecedentError> {
        self.ensure_available()?;

        if precedent.case_hash.is_empty() {
            return Err(PrecedentError::InvalidPrecedent(
                "Case hash is required".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if let Some(existing) = state.by_case_hash.get(&precedent.case_hash) {
            tracing::debug!(
                precedent_id = %existing,
                case_hash = %precedent.case_hash,
                "Precedent already recorded for case hash"
            );
            return Ok(existing.clone());
        }

        if precedent.embedding.is_none() {
            if let Some(embedder) = &self.embedder {
                precedent.embedding = Some(embedder.embed(&precedent.input_snapshot.prompt));
            }
        }

        let id = precedent.precedent_id.clone();
        state
            .by_case_hash
            .insert(precedent.case_hash.clone(), id.clone());
        state.precedents.insert(id.clone(), precedent);

        tracing::debug!(precedent_id = %id, "Stored precedent");
        Ok(id)
    }

    async fn attach_embedding(&self, precedent_id: &str, embedding: Vec<f32>) -> Result<(), PrecedentError> {
        self.ensure_available()?;

        let mut state = self.state.write().await;
        let precedent = state
            .precedents
            .get_mut(precedent_id)
            .ok_or_else(|| PrecedentError::NotFound(precedent_id.to_string()))?;
        precedent.embedding = Some(embedding);
        Ok(())
    }

    async fn get(&self, precedent_id: &str) -> Result<Precedent, PrecedentError> {
        self.ensure_available()?;

        let state = self.state.read().await;
        state
            .precedents
            .get(precedent_id)
            .cloned()
            .ok_or_else(|| PrecedentError::NotFound(precedent_id.to_string()))
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
