//! NameResolver trait definition for raw-id to display-name mapping

/// Maps raw dataset identifiers to human-readable names and relation labels.
///
/// Implementations may be backed by a local file or a network lookup with its
/// own cache; the core treats resolution as synchronous and idempotent.
pub trait NameResolver: Send + Sync {
    /// Converts an entity id (e.g. `/m/0grwj`) to a display name.
    fn resolve_entity(&self, raw_id: &str) -> String;

    /// Converts a relation id (e.g. `/people/person/profession`) to a
    /// readable label.
    fn resolve_relation(&self, raw_id: &str) -> String;
}
