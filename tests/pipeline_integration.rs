//! End-to-end pipeline tests: raw triples through canonicalization,
//! construction and retrieval, against the in-memory store and the
//! deterministic embedding service.

use std::collections::HashMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use factgraph::{
    BuilderConfig, Canonicalizer, EmbeddingCache, EmbeddingCacheConfig, FileNameResolver,
    GraphBuilder, GraphStore, MemoryGraphStore, MockEmbeddingService, QueryEngine, RawTriple,
    Retriever, TraceContext, NO_RESULTS_SENTINEL,
};

const DIMENSION: usize = 32;

fn resolver() -> FileNameResolver {
    let mut map = HashMap::new();
    map.insert("/m/0grwj".to_string(), "Jackie Chan".to_string());
    map.insert("/m/actor".to_string(), "Actor".to_string());
    map.insert("/m/0hk".to_string(), "Hong Kong".to_string());
    map.insert("/m/china".to_string(), "China".to_string());
    FileNameResolver::from_map(map)
}

fn raw_triples() -> Vec<RawTriple> {
    vec![
        RawTriple::new("/m/0grwj", "/people/person/profession", "/m/actor"),
        // Exact duplicate of the first triple, dropped by canonicalization.
        RawTriple::new("/m/0grwj", "/people/person/profession", "/m/actor"),
        RawTriple::new("/m/0grwj", "/people/person/place_of_birth", "/m/0hk"),
        RawTriple::new("/m/0hk", "/location/location/containedby", "/m/china"),
        // Second relation on the same entity pair; collapses onto the one
        // merged edge between Jackie Chan and Hong Kong.
        RawTriple::new("/m/0grwj", "/people/person/residence", "/m/0hk"),
    ]
}

async fn open_cache(dir: &tempfile::TempDir) -> Arc<EmbeddingCache> {
    Arc::new(
        EmbeddingCache::open(
            EmbeddingCacheConfig {
                path: dir.path().join("embeddings.json"),
            },
            Arc::new(MockEmbeddingService::new(DIMENSION)),
        )
        .await
        .unwrap(),
    )
}

fn builder_config() -> BuilderConfig {
    BuilderConfig {
        batch_size: 2,
        embedding_dimension: DIMENSION,
        ..BuilderConfig::default()
    }
}

async fn build_graph(store: Arc<MemoryGraphStore>, dir: &tempfile::TempDir) -> Arc<EmbeddingCache> {
    let ctx = TraceContext::default();
    let resolver = resolver();
    let mut canonicalizer = Canonicalizer::new();
    let facts = canonicalizer.canonicalize(raw_triples(), &resolver);

    let cache = open_cache(dir).await;
    let builder = GraphBuilder::new(store, cache.clone(), builder_config());
    builder.create_schema(&ctx).await.unwrap();
    builder.build(&facts, &ctx).await.unwrap();
    cache
}

#[test_log::test(tokio::test)]
async fn test_full_pipeline_dedups_and_retrieves() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryGraphStore::new());
    let ctx = TraceContext::default();
    let cache = build_graph(store.clone(), &dir).await;

    let stats = store.statistics(10, &ctx).await.unwrap();
    assert_eq!(stats.facts, 4, "duplicate triple collapses to one fact");
    assert_eq!(stats.entities, 4);
    assert_eq!(
        stats.relationships, 3,
        "multi-relation pair keeps a single merged edge"
    );

    let engine = Arc::new(QueryEngine::new(store, "fact_embeddings"));
    let retriever = Retriever::new(cache, engine);
    let result = retriever
        .retrieve("What is Jackie Chan's profession?", Some(5), &ctx)
        .await;

    assert!(result.context.contains("Jackie Chan Profession Actor"));
    assert!(result.metadata.found >= 1);
    assert_eq!(result.facts.len(), result.metadata.found);
}

#[tokio::test]
async fn test_rebuild_over_same_input_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryGraphStore::new());
    let ctx = TraceContext::default();
    build_graph(store.clone(), &dir).await;
    let first = store.statistics(0, &ctx).await.unwrap();

    // Second run: a fresh canonicalizer re-emits the same facts; the store
    // merges them onto the existing nodes.
    build_graph(store.clone(), &dir).await;
    let second = store.statistics(0, &ctx).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_retrieve_on_empty_store_returns_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryGraphStore::new());
    let ctx = TraceContext::default();
    let cache = open_cache(&dir).await;

    let builder = GraphBuilder::new(store.clone(), cache.clone(), builder_config());
    builder.create_schema(&ctx).await.unwrap();

    let engine = Arc::new(QueryEngine::new(store, "fact_embeddings"));
    let retriever = Retriever::new(cache, engine);
    let result = retriever.retrieve("anything at all", None, &ctx).await;

    assert_eq!(result.context, NO_RESULTS_SENTINEL);
    assert_eq!(result.metadata.found, 0);
}

#[test_log::test(tokio::test)]
async fn test_both_edge_strategies_answer_the_same_traversals() {
    let ctx = TraceContext::default();

    let typed_dir = tempfile::tempdir().unwrap();
    let typed_store = Arc::new(MemoryGraphStore::new());
    build_graph(typed_store.clone(), &typed_dir).await;

    let generic_dir = tempfile::tempdir().unwrap();
    let generic_store = Arc::new(MemoryGraphStore::without_dynamic_edge_types());
    build_graph(generic_store.clone(), &generic_dir).await;

    for store in [&typed_store as &Arc<MemoryGraphStore>, &generic_store] {
        let engine = QueryEngine::new(store.clone() as Arc<dyn GraphStore>, "fact_embeddings");
        let hits = engine.search_by_name("jackie", 10, &ctx).await.unwrap();
        assert_eq!(hits[0].name, "Jackie Chan");
        assert_eq!(
            hits[0].degree, 2,
            "two relations to Hong Kong still count as one edge"
        );

        let facts = engine.multi_hop("China", 2, 30, &ctx).await.unwrap();
        let texts: Vec<&str> = facts.iter().map(|f| f.text.as_str()).collect();
        assert!(texts.contains(&"Jackie Chan Place Of Birth Hong Kong"));
        assert!(facts.iter().all(|f| f.distance <= 2));

        let neighbors = store.entity_neighbors("Jackie Chan", 10, &ctx).await.unwrap();
        let to_hong_kong: Vec<_> = neighbors.iter().filter(|n| n.name == "Hong Kong").collect();
        assert_eq!(to_hong_kong.len(), 1, "one merged edge per entity pair");
        assert_eq!(to_hong_kong[0].readable, "Residence", "last write wins");
    }

    // The strategies differ only in edge representation.
    let typed = typed_store.entity_neighbors("Hong Kong", 10, &ctx).await.unwrap();
    let generic = generic_store
        .entity_neighbors("Hong Kong", 10, &ctx)
        .await
        .unwrap();
    assert!(typed.iter().any(|n| n.relation == "CONTAINEDBY"));
    assert!(generic.iter().all(|n| n.relation == "RELATED_TO"));
    let typed_names: Vec<&str> = typed.iter().map(|n| n.name.as_str()).collect();
    let generic_names: Vec<&str> = generic.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(typed_names, generic_names);
}

#[tokio::test]
async fn test_embedding_cache_is_reused_across_builds() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryGraphStore::new());
    let cache = build_graph(store, &dir).await;
    let warm_entries = cache.len().await;
    assert_eq!(warm_entries, 4);

    // A rebuild into a fresh store finds every embedding already cached.
    let second_store = Arc::new(MemoryGraphStore::new());
    let cache = build_graph(second_store, &dir).await;
    assert_eq!(cache.len().await, warm_entries);
}
