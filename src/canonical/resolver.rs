//! File-backed name resolution for raw dataset identifiers.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::data::CoreError;
use crate::traits::NameResolver;

/// Resolver backed by a tab-separated `id<TAB>name` mapping file, with
/// deterministic fallbacks for unmapped ids.
pub struct FileNameResolver {
    entity_to_name: HashMap<String, String>,
}

impl FileNameResolver {
    /// Creates an empty resolver; every id falls back to its cleaned form.
    pub fn empty() -> Self {
        Self {
            entity_to_name: HashMap::new(),
        }
    }

    /// Loads an `id<TAB>name` mapping file. Lines without a tab-separated
    /// second column are skipped.
    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let content = fs::read_to_string(path)?;
        let mut entity_to_name = HashMap::new();
        for line in content.lines() {
            let mut parts = line.trim().splitn(3, '\t');
            if let (Some(id), Some(name)) = (parts.next(), parts.next()) {
                if !id.is_empty() && !name.is_empty() {
                    entity_to_name.insert(id.to_string(), name.to_string());
                }
            }
        }
        info!(count = entity_to_name.len(), "Loaded entity name mappings");
        Ok(Self { entity_to_name })
    }

    /// Builds a resolver from an in-memory mapping. Used by tests.
    pub fn from_map(entity_to_name: HashMap<String, String>) -> Self {
        Self { entity_to_name }
    }

    fn clean_entity_id(entity_id: &str) -> String {
        let cleaned = entity_id
            .strip_prefix("/m/")
            .or_else(|| entity_id.strip_prefix("/g/"))
            .unwrap_or(entity_id);
        format!("Entity_{}", cleaned)
    }
}

impl NameResolver for FileNameResolver {
    fn resolve_entity(&self, raw_id: &str) -> String {
        match self.entity_to_name.get(raw_id) {
            Some(name) => name.clone(),
            None => Self::clean_entity_id(raw_id),
        }
    }

    fn resolve_relation(&self, raw_id: &str) -> String {
        // Last path segment, underscores to spaces, title case.
        let segment = raw_id.rsplit('/').next().unwrap_or(raw_id);
        segment
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_entity_with_mapping() {
        let mut map = HashMap::new();
        map.insert("/m/0grwj".to_string(), "Jackie Chan".to_string());
        let resolver = FileNameResolver::from_map(map);
        assert_eq!(resolver.resolve_entity("/m/0grwj"), "Jackie Chan");
    }

    #[test]
    fn test_resolve_entity_fallback_cleans_namespace() {
        let resolver = FileNameResolver::empty();
        assert_eq!(resolver.resolve_entity("/m/0grwj"), "Entity_0grwj");
        assert_eq!(resolver.resolve_entity("/g/11b7"), "Entity_11b7");
        assert_eq!(resolver.resolve_entity("plain"), "Entity_plain");
    }

    #[test]
    fn test_resolve_relation_uses_last_segment() {
        let resolver = FileNameResolver::empty();
        assert_eq!(
            resolver.resolve_relation("/people/person/profession"),
            "Profession"
        );
        assert_eq!(
            resolver.resolve_relation("/film/film/country_of_origin"),
            "Country Of Origin"
        );
    }
}
