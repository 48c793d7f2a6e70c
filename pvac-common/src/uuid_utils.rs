//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Deterministic UUIDv5 for an image source (URL namespace)
///
/// The same source string always yields the same id, so repeated runs over
/// the same inputs hit the same cache entries.
pub fn source_id(source: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, source.as_bytes())
}
