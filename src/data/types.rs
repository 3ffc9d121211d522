//! Typed records exchanged between the canonicalizer, builder, query engine
//! and retrieval orchestrator.
//!
//! Each query operation returns its own fixed-shape struct rather than a
//! generic property map, so callers are independent of the underlying store's
//! native row format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A raw (head, relation, tail) triple as found in the source dataset,
/// identified by opaque ids that a [`crate::traits::NameResolver`] turns into
/// display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTriple {
    pub head_id: String,
    pub relation_id: String,
    pub tail_id: String,
}

impl RawTriple {
    pub fn new(
        head_id: impl Into<String>,
        relation_id: impl Into<String>,
        tail_id: impl Into<String>,
    ) -> Self {
        Self {
            head_id: head_id.into(),
            relation_id: relation_id.into(),
            tail_id: tail_id.into(),
        }
    }
}

/// One canonicalized fact: the rendered sentence plus its resolved parts.
/// Output of the canonicalizer, input to the graph builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactRecord {
    /// Rendered sentence, e.g. "Jackie Chan profession Actor".
    pub text: String,
    pub head_name: String,
    pub relation_label: String,
    pub tail_name: String,
}

impl FactRecord {
    pub fn new(
        head_name: impl Into<String>,
        relation_label: impl Into<String>,
        tail_name: impl Into<String>,
    ) -> Self {
        let head_name = head_name.into();
        let relation_label = relation_label.into();
        let tail_name = tail_name.into();
        Self {
            text: format!("{} {} {}", head_name, relation_label, tail_name),
            head_name,
            relation_label,
            tail_name,
        }
    }

    /// Case-insensitive dedup key: `lowercase(head)|lowercase(relation)|lowercase(tail)`.
    pub fn canonical_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.head_name.to_lowercase(),
            self.relation_label.to_lowercase(),
            self.tail_name.to_lowercase()
        )
    }
}

/// One row of a batched graph upsert: a fact record together with the
/// derived data the store needs to materialize it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactUpsert {
    pub record: FactRecord,
    /// Lowercase alias tokens for the head entity, merged on re-encounter.
    pub head_aliases: Vec<String>,
    pub tail_aliases: Vec<String>,
    /// Sanitized edge-type form of the relation (alphanumeric + underscore,
    /// uppercase), used when the store supports dynamic relationship types.
    pub relation_type: String,
    /// Unit-normalized embedding of `record.text`.
    pub embedding: Vec<f32>,
}

/// How the denormalized relation edge between two entities is represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeStrategy {
    /// The relation's own sanitized label becomes the edge type
    /// (e.g. "profession" -> `PROFESSION`). Requires dynamic edge-type
    /// creation in the store.
    Typed,
    /// Single generic `RELATED_TO` edge type carrying the relation as a
    /// property. Works on any store.
    Generic,
}

impl fmt::Display for EdgeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeStrategy::Typed => write!(f, "typed"),
            EdgeStrategy::Generic => write!(f, "generic"),
        }
    }
}

/// Result of an idempotent DDL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOutcome {
    Created,
    AlreadyExists,
}

/// Entity hit from a substring search, ranked by degree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySearchResult {
    pub name: String,
    /// Count of relation edges incident to the entity, used as a relevance
    /// proxy.
    pub degree: usize,
}

/// Fact hit from a vector similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFact {
    pub text: String,
    pub score: f32,
}

/// Fact reached by a bounded multi-hop traversal, annotated with the minimum
/// hop distance at which it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopFact {
    pub text: String,
    pub distance: usize,
}

/// One-hop neighbor of an entity along a relation edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborResult {
    pub name: String,
    /// Raw relation label as stored on the edge.
    pub relation: String,
    /// Human-readable relation label.
    pub readable: String,
}

/// Post-build verification counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub entities: usize,
    pub facts: usize,
    pub relationships: usize,
    pub sample_entities: Vec<String>,
}

/// Outcome of one construction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub facts_written: usize,
    /// Facts dropped because their embedding could not be computed.
    pub facts_skipped: usize,
    pub batches: usize,
    /// Edge strategy in effect at the end of the run.
    pub strategy: EdgeStrategy,
}

/// Structured metadata accompanying a retrieval result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalMetadata {
    pub query: String,
    pub found: usize,
}

/// Ranked, deduplicated retrieval output handed to the generation
/// collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub facts: Vec<ScoredFact>,
    pub context: String,
    pub metadata: RetrievalMetadata,
}
