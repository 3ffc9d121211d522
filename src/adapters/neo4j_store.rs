//! Neo4j implementation of the graph store contract.
//!
//! Entities are `:Entity` nodes merged by name, facts are `:Fact` nodes
//! merged on a lowercase text key and carrying the embedding property, and
//! the denormalized relation edge between head and tail is either a typed
//! edge (via APOC dynamic relationship creation) or a generic `RELATED_TO`
//! edge when APOC is unavailable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, Query};
use parking_lot::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::data::{
    errors::GraphStoreError,
    trace_context::TraceContext,
    types::{
        EdgeStrategy, EntitySearchResult, FactUpsert, GraphStatistics, HopFact, NeighborResult,
        SchemaOutcome, ScoredFact,
    },
};
use crate::traits::GraphStore;

/// Configuration for the Neo4j connection.
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub pool_size: usize,
    pub connection_retry_count: u32,
    pub connection_retry_delay: Duration,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "neo4j://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: "password".to_string(),
            database: None,
            pool_size: 10,
            connection_retry_count: 3,
            connection_retry_delay: Duration::from_secs(2),
        }
    }
}

impl Neo4jConfig {
    /// Reads connection settings from `NEO4J_URI`, `NEO4J_USERNAME`,
    /// `NEO4J_PASSWORD` and `NEO4J_DATABASE`, with defaults for the rest.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            uri: std::env::var("NEO4J_URI").unwrap_or(defaults.uri),
            username: std::env::var("NEO4J_USERNAME").unwrap_or(defaults.username),
            password: std::env::var("NEO4J_PASSWORD").unwrap_or(defaults.password),
            database: std::env::var("NEO4J_DATABASE").ok(),
            ..defaults
        }
    }
}

/// Neo4j-backed [`GraphStore`].
pub struct Neo4jGraphStore {
    graph: Arc<Graph>,
    config: Neo4jConfig,
    /// Cached outcome of the APOC capability probe.
    dynamic_edge_probe: RwLock<Option<bool>>,
}

impl Neo4jGraphStore {
    pub fn config(&self) -> &Neo4jConfig {
        &self.config
    }

    /// Connects with retries, verifying the connection with a trivial query.
    pub async fn connect(config: Neo4jConfig) -> Result<Self, GraphStoreError> {
        let mut config_builder = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.username)
            .password(&config.password)
            .max_connections(config.pool_size);

        if let Some(db) = &config.database {
            config_builder = config_builder.db(db.as_str());
        }

        let neo4j_config = config_builder.build().map_err(|e| {
            GraphStoreError::ConnectionError(format!("Failed to build Neo4j config: {}", e))
        })?;

        let mut last_error = None;
        for attempt in 1..=config.connection_retry_count {
            match Graph::connect(neo4j_config.clone()).await {
                Ok(graph) => match graph.execute(Query::new("RETURN 1 as test".to_string())).await
                {
                    Ok(_) => {
                        info!(uri = %config.uri, attempt, "Connected to Neo4j");
                        return Ok(Self {
                            graph: Arc::new(graph),
                            config,
                            dynamic_edge_probe: RwLock::new(None),
                        });
                    }
                    Err(e) => {
                        error!("Connection test failed: {}", e);
                        last_error = Some(e);
                    }
                },
                Err(e) => {
                    error!("Failed to connect to Neo4j (attempt {}): {}", attempt, e);
                    last_error = Some(e);
                    if attempt < config.connection_retry_count {
                        tokio::time::sleep(config.connection_retry_delay).await;
                    }
                }
            }
        }

        Err(GraphStoreError::ConnectionError(format!(
            "Failed to connect to Neo4j after {} attempts. Last error: {:?}",
            config.connection_retry_count, last_error
        )))
    }

    fn map_error(e: neo4rs::Error) -> GraphStoreError {
        let message = e.to_string();
        let lower = message.to_lowercase();
        if lower.contains("unknown procedure")
            || lower.contains("unknown function")
            || lower.contains("apoc")
        {
            GraphStoreError::DynamicEdgeTypesUnsupported(message)
        } else if lower.contains("serviceunavailable")
            || lower.contains("connection")
            || lower.contains("timed out")
            || lower.contains("transient")
        {
            GraphStoreError::Transient(message)
        } else {
            GraphStoreError::QueryError(message)
        }
    }

    async fn schema_object_exists(&self, name: &str) -> Result<bool, GraphStoreError> {
        for statement in [
            "SHOW INDEXES YIELD name WHERE name = $name RETURN name",
            "SHOW CONSTRAINTS YIELD name WHERE name = $name RETURN name",
        ] {
            let query = Query::new(statement.to_string()).param("name", name.to_string());
            match self.graph.execute(query).await {
                Ok(mut result) => {
                    if matches!(result.next().await, Ok(Some(_))) {
                        return Ok(true);
                    }
                }
                Err(e) => {
                    warn!("Error checking schema object '{}': {}", name, e);
                }
            }
        }
        Ok(false)
    }

    /// Runs a DDL statement, treating "already exists" as a tolerated
    /// outcome.
    async fn run_ddl(&self, statement: String) -> Result<SchemaOutcome, GraphStoreError> {
        match self.graph.run(Query::new(statement)).await {
            Ok(_) => Ok(SchemaOutcome::Created),
            Err(e) if e.to_string().to_lowercase().contains("already exists") => {
                Ok(SchemaOutcome::AlreadyExists)
            }
            Err(e) => Err(GraphStoreError::SchemaError(e.to_string())),
        }
    }

    async fn count(&self, statement: &str) -> Result<usize, GraphStoreError> {
        let mut result = self
            .graph
            .execute(Query::new(statement.to_string()))
            .await
            .map_err(Self::map_error)?;
        match result.next().await.map_err(Self::map_error)? {
            Some(row) => {
                let count: i64 = row
                    .get("count")
                    .map_err(|e| GraphStoreError::MappingError(e.to_string()))?;
                Ok(count as usize)
            }
            None => Ok(0),
        }
    }

    async fn upsert_relation_edge(
        &self,
        upsert: &FactUpsert,
        strategy: EdgeStrategy,
    ) -> Result<(), GraphStoreError> {
        // One merged relation edge per entity pair, last write wins: edges
        // of any other type between the pair are dropped before the merge,
        // since the merge identity includes the relationship type.
        let statement = match strategy {
            EdgeStrategy::Typed => {
                "MATCH (h:Entity {name: $head_name}), (t:Entity {name: $tail_name}) \
                 OPTIONAL MATCH (h)-[stale]->(t) WHERE type(stale) <> $relation_type \
                 DELETE stale \
                 WITH DISTINCT h, t \
                 CALL apoc.merge.relationship(h, $relation_type, {}, \
                 {relation: $relation_type, readable: $readable}, t) YIELD rel \
                 RETURN count(rel) as count"
            }
            EdgeStrategy::Generic => {
                "MATCH (h:Entity {name: $head_name}), (t:Entity {name: $tail_name}) \
                 OPTIONAL MATCH (h)-[stale]->(t) WHERE type(stale) <> 'RELATED_TO' \
                 DELETE stale \
                 WITH DISTINCT h, t \
                 MERGE (h)-[r:RELATED_TO]->(t) \
                 SET r.relation = $relation_type, r.readable = $readable"
            }
        };
        let query = Query::new(statement.to_string())
            .param("head_name", upsert.record.head_name.as_str())
            .param("tail_name", upsert.record.tail_name.as_str())
            .param("relation_type", upsert.relation_type.as_str())
            .param("readable", upsert.record.relation_label.as_str());
        self.graph.run(query).await.map_err(Self::map_error)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    #[instrument(skip(self, ctx), fields(trace_id = %ctx.trace_id))]
    async fn clear(&self, ctx: &TraceContext) -> Result<(), GraphStoreError> {
        warn!("Clearing all graph data");
        self.graph
            .run(Query::new("MATCH (n) DETACH DELETE n".to_string()))
            .await
            .map_err(Self::map_error)
    }

    async fn ensure_unique_constraint(
        &self,
        label: &str,
        property: &str,
        _ctx: &TraceContext,
    ) -> Result<SchemaOutcome, GraphStoreError> {
        let name = format!("{}_{}", label.to_lowercase(), property.to_lowercase());
        if self.schema_object_exists(&name).await? {
            debug!("Constraint '{}' already exists", name);
            return Ok(SchemaOutcome::AlreadyExists);
        }
        self.run_ddl(format!(
            "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
            name, label, property
        ))
        .await
    }

    async fn ensure_index(
        &self,
        label: &str,
        property: &str,
        _ctx: &TraceContext,
    ) -> Result<SchemaOutcome, GraphStoreError> {
        let name = format!("{}_{}", label.to_lowercase(), property.to_lowercase());
        if self.schema_object_exists(&name).await? {
            debug!("Index '{}' already exists", name);
            return Ok(SchemaOutcome::AlreadyExists);
        }
        self.run_ddl(format!(
            "CREATE INDEX {} IF NOT EXISTS FOR (n:{}) ON (n.{})",
            name, label, property
        ))
        .await
    }

    async fn ensure_vector_index(
        &self,
        index_name: &str,
        label: &str,
        property: &str,
        dimensions: usize,
        _ctx: &TraceContext,
    ) -> Result<SchemaOutcome, GraphStoreError> {
        if self.schema_object_exists(index_name).await? {
            debug!("Vector index '{}' already exists", index_name);
            return Ok(SchemaOutcome::AlreadyExists);
        }
        debug!("Creating vector index '{}'", index_name);
        self.run_ddl(format!(
            "CALL db.index.vector.createNodeIndex('{}', '{}', '{}', {}, 'cosine')",
            index_name, label, property, dimensions
        ))
        .await
    }

    async fn supports_dynamic_edge_types(&self, _ctx: &TraceContext) -> bool {
        if let Some(probed) = *self.dynamic_edge_probe.read() {
            return probed;
        }
        let supported = match self
            .graph
            .execute(Query::new("RETURN apoc.version() as version".to_string()))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!("APOC probe failed, falling back to generic edges: {}", e);
                false
            }
        };
        *self.dynamic_edge_probe.write() = Some(supported);
        supported
    }

    #[instrument(skip(self, batch, ctx), fields(trace_id = %ctx.trace_id, batch = batch.len(), %strategy))]
    async fn upsert_fact_batch(
        &self,
        batch: &[FactUpsert],
        strategy: EdgeStrategy,
        ctx: &TraceContext,
    ) -> Result<(), GraphStoreError> {
        for upsert in batch {
            let embedding: Vec<f64> = upsert.embedding.iter().map(|v| *v as f64).collect();
            let fact_query = Query::new(
                "MERGE (h:Entity {name: $head_name}) \
                 SET h.aliases = coalesce(h.aliases, []) + \
                 [x IN $head_aliases WHERE NOT x IN coalesce(h.aliases, [])] \
                 MERGE (t:Entity {name: $tail_name}) \
                 SET t.aliases = coalesce(t.aliases, []) + \
                 [x IN $tail_aliases WHERE NOT x IN coalesce(t.aliases, [])] \
                 MERGE (f:Fact {text_key: $text_key}) \
                 ON CREATE SET f.text = $text, f.embedding = $embedding \
                 MERGE (f)-[:HAS_HEAD]->(h) \
                 MERGE (f)-[:HAS_TAIL]->(t)"
                    .to_string(),
            )
            .param("head_name", upsert.record.head_name.as_str())
            .param("tail_name", upsert.record.tail_name.as_str())
            .param("head_aliases", upsert.head_aliases.clone())
            .param("tail_aliases", upsert.tail_aliases.clone())
            .param("text_key", upsert.record.text.to_lowercase())
            .param("text", upsert.record.text.as_str())
            .param("embedding", embedding);
            self.graph.run(fact_query).await.map_err(Self::map_error)?;

            self.upsert_relation_edge(upsert, strategy).await?;
        }
        debug!(facts = batch.len(), "Upserted fact batch");
        Ok(())
    }

    async fn search_entities(
        &self,
        term: &str,
        limit: usize,
        _ctx: &TraceContext,
    ) -> Result<Vec<EntitySearchResult>, GraphStoreError> {
        let query = Query::new(
            "MATCH (e:Entity) \
             WHERE toLower(e.name) CONTAINS $term \
             OR any(a IN coalesce(e.aliases, []) WHERE a CONTAINS $term) \
             OPTIONAL MATCH (e)-[r]-(:Entity) \
             WITH e, count(r) as degree \
             RETURN e.name as name, degree \
             ORDER BY degree DESC \
             LIMIT $limit"
                .to_string(),
        )
        .param("term", term.to_lowercase())
        .param("limit", limit as i64);

        let mut result = self.graph.execute(query).await.map_err(Self::map_error)?;
        let mut hits = Vec::new();
        while let Some(row) = result.next().await.map_err(Self::map_error)? {
            let name: String = row
                .get("name")
                .map_err(|e| GraphStoreError::MappingError(e.to_string()))?;
            let degree: i64 = row
                .get("degree")
                .map_err(|e| GraphStoreError::MappingError(e.to_string()))?;
            hits.push(EntitySearchResult {
                name,
                degree: degree as usize,
            });
        }
        Ok(hits)
    }

    async fn vector_search(
        &self,
        index_name: &str,
        embedding: &[f32],
        k: usize,
        _ctx: &TraceContext,
    ) -> Result<Vec<ScoredFact>, GraphStoreError> {
        let embedding: Vec<f64> = embedding.iter().map(|v| *v as f64).collect();
        let query = Query::new(
            "CALL db.index.vector.queryNodes($index_name, $k, $embedding) \
             YIELD node, score \
             RETURN node.text as text, score"
                .to_string(),
        )
        .param("index_name", index_name.to_string())
        .param("k", k as i64)
        .param("embedding", embedding);

        let mut result = match self.graph.execute(query).await {
            Ok(result) => result,
            Err(e) => {
                let lower = e.to_string().to_lowercase();
                if lower.contains("no such") || (lower.contains("index") && lower.contains("not found"))
                {
                    return Err(GraphStoreError::VectorIndexUnavailable(
                        index_name.to_string(),
                    ));
                }
                return Err(Self::map_error(e));
            }
        };

        let mut hits = Vec::new();
        while let Some(row) = result.next().await.map_err(Self::map_error)? {
            let text: String = row
                .get("text")
                .map_err(|e| GraphStoreError::MappingError(e.to_string()))?;
            let score: f64 = row
                .get("score")
                .map_err(|e| GraphStoreError::MappingError(e.to_string()))?;
            hits.push(ScoredFact {
                text,
                score: score as f32,
            });
        }
        Ok(hits)
    }

    async fn entity_neighbors(
        &self,
        entity_name: &str,
        limit: usize,
        _ctx: &TraceContext,
    ) -> Result<Vec<NeighborResult>, GraphStoreError> {
        let query = Query::new(
            "MATCH (e:Entity)-[r]-(n:Entity) \
             WHERE toLower(e.name) = toLower($name) \
             RETURN n.name as name, type(r) as relation, \
             coalesce(r.readable, type(r)) as readable \
             LIMIT $limit"
                .to_string(),
        )
        .param("name", entity_name.to_string())
        .param("limit", limit as i64);

        let mut result = self.graph.execute(query).await.map_err(Self::map_error)?;
        let mut neighbors = Vec::new();
        while let Some(row) = result.next().await.map_err(Self::map_error)? {
            let name: String = row
                .get("name")
                .map_err(|e| GraphStoreError::MappingError(e.to_string()))?;
            let relation: String = row
                .get("relation")
                .map_err(|e| GraphStoreError::MappingError(e.to_string()))?;
            let readable: String = row
                .get("readable")
                .map_err(|e| GraphStoreError::MappingError(e.to_string()))?;
            neighbors.push(NeighborResult {
                name,
                relation,
                readable,
            });
        }
        Ok(neighbors)
    }

    async fn multi_hop_facts(
        &self,
        entity_name: &str,
        hops: usize,
        limit: usize,
        _ctx: &TraceContext,
    ) -> Result<Vec<HopFact>, GraphStoreError> {
        // Cypher cannot parameterize a variable-length bound; hops is clamped
        // to a small constant by the caller before it reaches this query.
        let statement = format!(
            "MATCH path = (e:Entity)-[*1..{}]-(other:Entity) \
             WHERE toLower(e.name) = toLower($name) \
             AND all(n IN nodes(path) WHERE n:Entity) \
             WITH other, min(length(path)) as distance \
             MATCH (f:Fact)-[:HAS_HEAD|HAS_TAIL]->(other) \
             OPTIONAL MATCH (other)-[r]-(:Entity) \
             WITH f, distance, count(r) as degree \
             WITH f, min(distance) as distance, max(degree) as degree \
             RETURN f.text as text, distance \
             ORDER BY distance ASC, degree DESC \
             LIMIT $limit",
            hops
        );
        let query = Query::new(statement)
            .param("name", entity_name.to_string())
            .param("limit", limit as i64);

        let mut result = self.graph.execute(query).await.map_err(Self::map_error)?;
        let mut facts = Vec::new();
        while let Some(row) = result.next().await.map_err(Self::map_error)? {
            let text: String = row
                .get("text")
                .map_err(|e| GraphStoreError::MappingError(e.to_string()))?;
            let distance: i64 = row
                .get("distance")
                .map_err(|e| GraphStoreError::MappingError(e.to_string()))?;
            facts.push(HopFact {
                text,
                distance: distance as usize,
            });
        }
        Ok(facts)
    }

    async fn statistics(
        &self,
        sample_size: usize,
        _ctx: &TraceContext,
    ) -> Result<GraphStatistics, GraphStoreError> {
        let entities = self
            .count("MATCH (e:Entity) RETURN count(e) as count")
            .await?;
        let facts = self.count("MATCH (f:Fact) RETURN count(f) as count").await?;
        let relationships = self
            .count("MATCH (:Entity)-[r]->(:Entity) RETURN count(r) as count")
            .await?;

        let query = Query::new(
            "MATCH (e:Entity) RETURN e.name as name ORDER BY rand() LIMIT $limit".to_string(),
        )
        .param("limit", sample_size as i64);
        let mut result = self.graph.execute(query).await.map_err(Self::map_error)?;
        let mut sample_entities = Vec::new();
        while let Some(row) = result.next().await.map_err(Self::map_error)? {
            let name: String = row
                .get("name")
                .map_err(|e| GraphStoreError::MappingError(e.to_string()))?;
            sample_entities.push(name);
        }

        Ok(GraphStatistics {
            entities,
            facts,
            relationships,
            sample_entities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotenv::dotenv;
    use std::env;

    async fn connect_from_env() -> Option<Neo4jGraphStore> {
        dotenv().ok();
        if env::var("NEO4J_URI").is_err() {
            eprintln!("Skipping test: NEO4J_URI not set");
            return None;
        }
        match Neo4jGraphStore::connect(Neo4jConfig::from_env()).await {
            Ok(store) => Some(store),
            Err(e) => {
                eprintln!("Skipping test: Neo4j unavailable: {}", e);
                None
            }
        }
    }

    #[tokio::test]
    async fn test_schema_ddl_is_idempotent_against_live_store() {
        let Some(store) = connect_from_env().await else {
            return;
        };
        let ctx = TraceContext::default();

        store
            .ensure_unique_constraint("Entity", "name", &ctx)
            .await
            .unwrap();
        let second = store
            .ensure_unique_constraint("Entity", "name", &ctx)
            .await
            .unwrap();
        assert_eq!(second, SchemaOutcome::AlreadyExists);

        store
            .ensure_vector_index("fact_embeddings", "Fact", "embedding", 384, &ctx)
            .await
            .unwrap();
        let second = store
            .ensure_vector_index("fact_embeddings", "Fact", "embedding", 384, &ctx)
            .await
            .unwrap();
        assert_eq!(second, SchemaOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn test_capability_probe_is_cached() {
        let Some(store) = connect_from_env().await else {
            return;
        };
        let ctx = TraceContext::default();
        let first = store.supports_dynamic_edge_types(&ctx).await;
        let second = store.supports_dynamic_edge_types(&ctx).await;
        assert_eq!(first, second);
    }
}
