//! Triple canonicalization: resolving raw triples to human-readable fact
//! records and deduplicating them on an exact lowercase key.

mod resolver;

pub use resolver::FileNameResolver;

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::data::types::{FactRecord, RawTriple};
use crate::traits::NameResolver;

/// Streaming first-occurrence deduplicator for resolved triples.
///
/// The dedup key is the exact lowercase `head|relation|tail` string; fuzzy
/// matching here would either bloat the graph or silently drop distinct
/// facts. The seen-set persists across calls so repeated runs over the same
/// input emit nothing new.
pub struct Canonicalizer {
    seen: HashSet<String>,
}

impl Canonicalizer {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }

    /// Number of unique facts observed so far.
    pub fn unique_count(&self) -> usize {
        self.seen.len()
    }

    /// Resolves and deduplicates a sequence of raw triples, preserving the
    /// insertion order of first occurrences.
    #[instrument(skip_all, fields(seen = self.seen.len()))]
    pub fn canonicalize<I>(&mut self, triples: I, resolver: &dyn NameResolver) -> Vec<FactRecord>
    where
        I: IntoIterator<Item = RawTriple>,
    {
        let mut facts = Vec::new();
        let mut dropped = 0usize;
        for triple in triples {
            let head_name = resolver.resolve_entity(&triple.head_id);
            let tail_name = resolver.resolve_entity(&triple.tail_id);
            let relation_label = resolver.resolve_relation(&triple.relation_id);

            let record = FactRecord::new(head_name, relation_label, tail_name);
            if self.seen.insert(record.canonical_key()) {
                facts.push(record);
            } else {
                dropped += 1;
            }
        }
        debug!(emitted = facts.len(), dropped, "Canonicalized triples");
        facts
    }
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase alias tokens for an entity name: the full lowercase name plus
/// its whitespace-separated words. Used for substring search.
pub fn aliases_for(name: &str) -> Vec<String> {
    let lower = name.to_lowercase();
    let mut aliases = vec![lower.clone()];
    for token in lower.split_whitespace() {
        if token != lower && !aliases.iter().any(|a| a == token) {
            aliases.push(token.to_string());
        }
    }
    aliases
}

/// Sanitizes a relation label into a valid edge-type name: alphanumeric and
/// underscore only, uppercase.
pub fn sanitize_relation_type(relation: &str) -> String {
    relation
        .trim_matches('/')
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
