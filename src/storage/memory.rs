//! In-memory implementation of the graph store contract.
//!
//! Used for tests and offline development. Behaves like the production
//! adapter at the contract level: keyed merges, schema registration,
//! brute-force vector scoring over unit vectors, and bounded undirected
//! traversal.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::data::{
    errors::GraphStoreError,
    trace_context::TraceContext,
    types::{
        EdgeStrategy, EntitySearchResult, FactUpsert, GraphStatistics, HopFact, NeighborResult,
        SchemaOutcome, ScoredFact,
    },
};
use crate::traits::GraphStore;

const GENERIC_EDGE_TYPE: &str = "RELATED_TO";

struct EntityNode {
    /// Display name with first-seen casing.
    name: String,
    aliases: BTreeSet<String>,
}

struct FactNode {
    /// Fact text with first-seen casing.
    text: String,
    head_key: String,
    tail_key: String,
    embedding: Vec<f32>,
}

struct RelEdge {
    edge_type: String,
    readable: String,
}

struct VectorIndexMeta {
    name: String,
    dimensions: usize,
}

#[derive(Default)]
struct StoreState {
    /// Lowercase name -> entity.
    entities: HashMap<String, EntityNode>,
    /// Lowercase fact text -> fact.
    facts: HashMap<String, FactNode>,
    /// (head key, tail key) -> merged relation edge, last write wins.
    edges: HashMap<(String, String), RelEdge>,
    constraints: HashSet<(String, String)>,
    indexes: HashSet<(String, String)>,
    vector_index: Option<VectorIndexMeta>,
    transient_failures: usize,
}

/// Process-local graph store.
pub struct MemoryGraphStore {
    state: RwLock<StoreState>,
    dynamic_edge_types: bool,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            dynamic_edge_types: true,
        }
    }

    /// A store that rejects dynamic edge types, forcing callers onto the
    /// generic edge strategy. Test support.
    pub fn without_dynamic_edge_types() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            dynamic_edge_types: false,
        }
    }

    /// Makes the next `n` batch upserts fail with a transient error. Test
    /// support for retry behavior.
    pub async fn inject_transient_failures(&self, n: usize) {
        self.state.write().await.transient_failures = n;
    }

    fn degree_of(state: &StoreState, entity_key: &str) -> usize {
        state
            .edges
            .keys()
            .filter(|(h, t)| h == entity_key || t == entity_key)
            .count()
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    #[instrument(skip(self, ctx), fields(trace_id = %ctx.trace_id))]
    async fn clear(&self, ctx: &TraceContext) -> Result<(), GraphStoreError> {
        let mut state = self.state.write().await;
        let removed = state.entities.len() + state.facts.len();
        state.entities.clear();
        state.facts.clear();
        state.edges.clear();
        // Schema registrations survive a data wipe.
        debug!(removed, "Cleared graph data");
        Ok(())
    }

    async fn ensure_unique_constraint(
        &self,
        label: &str,
        property: &str,
        _ctx: &TraceContext,
    ) -> Result<SchemaOutcome, GraphStoreError> {
        let mut state = self.state.write().await;
        if state
            .constraints
            .insert((label.to_string(), property.to_string()))
        {
            Ok(SchemaOutcome::Created)
        } else {
            Ok(SchemaOutcome::AlreadyExists)
        }
    }

    async fn ensure_index(
        &self,
        label: &str,
        property: &str,
        _ctx: &TraceContext,
    ) -> Result<SchemaOutcome, GraphStoreError> {
        let mut state = self.state.write().await;
        if state
            .indexes
            .insert((label.to_string(), property.to_string()))
        {
            Ok(SchemaOutcome::Created)
        } else {
            Ok(SchemaOutcome::AlreadyExists)
        }
    }

    async fn ensure_vector_index(
        &self,
        index_name: &str,
        _label: &str,
        _property: &str,
        dimensions: usize,
        _ctx: &TraceContext,
    ) -> Result<SchemaOutcome, GraphStoreError> {
        let mut state = self.state.write().await;
        match &state.vector_index {
            Some(existing) if existing.name == index_name => {
                if existing.dimensions != dimensions {
                    return Err(GraphStoreError::SchemaError(format!(
                        "vector index '{}' exists with dimension {}, requested {}",
                        index_name, existing.dimensions, dimensions
                    )));
                }
                Ok(SchemaOutcome::AlreadyExists)
            }
            _ => {
                state.vector_index = Some(VectorIndexMeta {
                    name: index_name.to_string(),
                    dimensions,
                });
                Ok(SchemaOutcome::Created)
            }
        }
    }

    async fn supports_dynamic_edge_types(&self, _ctx: &TraceContext) -> bool {
        self.dynamic_edge_types
    }

    #[instrument(skip(self, batch, ctx), fields(trace_id = %ctx.trace_id, batch = batch.len(), %strategy))]
    async fn upsert_fact_batch(
        &self,
        batch: &[FactUpsert],
        strategy: EdgeStrategy,
        ctx: &TraceContext,
    ) -> Result<(), GraphStoreError> {
        let mut state = self.state.write().await;

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(GraphStoreError::Transient(
                "injected transient failure".to_string(),
            ));
        }
        if strategy == EdgeStrategy::Typed && !self.dynamic_edge_types {
            return Err(GraphStoreError::DynamicEdgeTypesUnsupported(
                "store was configured without dynamic relationship types".to_string(),
            ));
        }
        if let Some(index) = &state.vector_index {
            if let Some(bad) = batch.iter().find(|u| u.embedding.len() != index.dimensions) {
                return Err(GraphStoreError::InvalidInput(format!(
                    "embedding of length {} does not fit vector index dimension {}",
                    bad.embedding.len(),
                    index.dimensions
                )));
            }
        }

        for upsert in batch {
            let head_key = upsert.record.head_name.to_lowercase();
            let tail_key = upsert.record.tail_name.to_lowercase();

            for (key, name, aliases) in [
                (&head_key, &upsert.record.head_name, &upsert.head_aliases),
                (&tail_key, &upsert.record.tail_name, &upsert.tail_aliases),
            ] {
                let entity = state
                    .entities
                    .entry(key.clone())
                    .or_insert_with(|| EntityNode {
                        name: name.clone(),
                        aliases: BTreeSet::new(),
                    });
                entity.aliases.extend(aliases.iter().cloned());
            }

            let fact_key = upsert.record.text.to_lowercase();
            state.facts.entry(fact_key).or_insert_with(|| FactNode {
                text: upsert.record.text.clone(),
                head_key: head_key.clone(),
                tail_key: tail_key.clone(),
                embedding: upsert.embedding.clone(),
            });

            let edge_type = match strategy {
                EdgeStrategy::Typed => upsert.relation_type.clone(),
                EdgeStrategy::Generic => GENERIC_EDGE_TYPE.to_string(),
            };
            state.edges.insert(
                (head_key, tail_key),
                RelEdge {
                    edge_type,
                    readable: upsert.record.relation_label.clone(),
                },
            );
        }
        Ok(())
    }

    async fn search_entities(
        &self,
        term: &str,
        limit: usize,
        _ctx: &TraceContext,
    ) -> Result<Vec<EntitySearchResult>, GraphStoreError> {
        let needle = term.to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.read().await;
        let mut hits: Vec<EntitySearchResult> = state
            .entities
            .iter()
            .filter(|(key, entity)| {
                key.contains(&needle) || entity.aliases.iter().any(|a| a.contains(&needle))
            })
            .map(|(key, entity)| EntitySearchResult {
                name: entity.name.clone(),
                degree: Self::degree_of(&state, key),
            })
            .collect();
        hits.sort_by(|a, b| b.degree.cmp(&a.degree).then_with(|| a.name.cmp(&b.name)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn vector_search(
        &self,
        index_name: &str,
        embedding: &[f32],
        k: usize,
        _ctx: &TraceContext,
    ) -> Result<Vec<ScoredFact>, GraphStoreError> {
        let state = self.state.read().await;
        let index = match &state.vector_index {
            Some(index) if index.name == index_name => index,
            _ => {
                return Err(GraphStoreError::VectorIndexUnavailable(
                    index_name.to_string(),
                ))
            }
        };
        if embedding.len() != index.dimensions {
            return Err(GraphStoreError::InvalidInput(format!(
                "query embedding of length {} does not fit vector index dimension {}",
                embedding.len(),
                index.dimensions
            )));
        }

        // Unit vectors, so the dot product is the cosine similarity.
        let mut scored: Vec<ScoredFact> = state
            .facts
            .values()
            .map(|fact| {
                let score: f32 = fact
                    .embedding
                    .iter()
                    .zip(embedding)
                    .map(|(a, b)| a * b)
                    .sum();
                ScoredFact {
                    text: fact.text.clone(),
                    score,
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.text.cmp(&b.text))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn entity_neighbors(
        &self,
        entity_name: &str,
        limit: usize,
        _ctx: &TraceContext,
    ) -> Result<Vec<NeighborResult>, GraphStoreError> {
        let key = entity_name.to_lowercase();
        let state = self.state.read().await;
        if !state.entities.contains_key(&key) {
            return Err(GraphStoreError::NotFound(entity_name.to_string()));
        }
        let mut neighbors: Vec<NeighborResult> = state
            .edges
            .iter()
            .filter_map(|((head, tail), edge)| {
                let other = if head == &key {
                    tail
                } else if tail == &key {
                    head
                } else {
                    return None;
                };
                state.entities.get(other).map(|entity| NeighborResult {
                    name: entity.name.clone(),
                    relation: edge.edge_type.clone(),
                    readable: edge.readable.clone(),
                })
            })
            .collect();
        neighbors.sort_by(|a, b| a.name.cmp(&b.name));
        neighbors.truncate(limit);
        Ok(neighbors)
    }

    async fn multi_hop_facts(
        &self,
        entity_name: &str,
        hops: usize,
        limit: usize,
        _ctx: &TraceContext,
    ) -> Result<Vec<HopFact>, GraphStoreError> {
        let seed = entity_name.to_lowercase();
        let state = self.state.read().await;
        if !state.entities.contains_key(&seed) {
            return Ok(Vec::new());
        }

        // Undirected BFS over relation edges, bounded by `hops`.
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for (head, tail) in state.edges.keys() {
            adjacency.entry(head).or_default().push(tail);
            adjacency.entry(tail).or_default().push(head);
        }
        let mut distances: HashMap<&str, usize> = HashMap::new();
        distances.insert(seed.as_str(), 0);
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(seed.as_str());
        while let Some(current) = queue.pop_front() {
            let next_distance = distances[current] + 1;
            if next_distance > hops {
                continue;
            }
            for &neighbor in adjacency.get(current).into_iter().flatten() {
                if !distances.contains_key(neighbor) {
                    distances.insert(neighbor, next_distance);
                    queue.push_back(neighbor);
                }
            }
        }

        // A fact's distance is the minimum distance of a reached endpoint,
        // counting only endpoints other than the seed itself.
        let mut facts: Vec<(HopFact, usize)> = state
            .facts
            .values()
            .filter_map(|fact| {
                let mut best: Option<(usize, &str)> = None;
                for endpoint in [fact.head_key.as_str(), fact.tail_key.as_str()] {
                    if endpoint == seed {
                        continue;
                    }
                    if let Some(&d) = distances.get(endpoint) {
                        if best.map_or(true, |(bd, _)| d < bd) {
                            best = Some((d, endpoint));
                        }
                    }
                }
                best.map(|(distance, endpoint)| {
                    (
                        HopFact {
                            text: fact.text.clone(),
                            distance,
                        },
                        Self::degree_of(&state, endpoint),
                    )
                })
            })
            .collect();
        facts.sort_by(|(a, a_deg), (b, b_deg)| {
            a.distance
                .cmp(&b.distance)
                .then_with(|| b_deg.cmp(a_deg))
                .then_with(|| a.text.cmp(&b.text))
        });
        let mut seen = HashSet::new();
        let mut out: Vec<HopFact> = Vec::new();
        for (fact, _) in facts {
            if seen.insert(fact.text.to_lowercase()) {
                out.push(fact);
                if out.len() == limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    async fn statistics(
        &self,
        sample_size: usize,
        _ctx: &TraceContext,
    ) -> Result<GraphStatistics, GraphStoreError> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.entities.values().map(|e| e.name.clone()).collect();
        let mut rng = rand::thread_rng();
        names.shuffle(&mut rng);
        names.truncate(sample_size);
        if state.entities.is_empty() {
            warn!("Statistics requested on an empty graph");
        }
        Ok(GraphStatistics {
            entities: state.entities.len(),
            facts: state.facts.len(),
            relationships: state.edges.len(),
            sample_entities: names,
        })
    }
}
