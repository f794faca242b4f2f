//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Catalog records are entities: two records with the same id are the same
/// record, whatever their current field values. Stores key their tables by
/// `Entity::Id` and use `entity_name()` in not-found diagnostics.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;

    /// Human-readable entity type name, for diagnostics.
    fn entity_name() -> &'static str;
}
