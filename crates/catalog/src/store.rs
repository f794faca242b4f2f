//! Catalog store contract.
//!
//! The reconciliation workflow depends on this trait only, never on a concrete
//! store. The contract deliberately mirrors what a transactional record store
//! offers: read-by-id, read-by-filter, create/update/delete, and a nested
//! checkpoint (savepoint) primitive for partial rollback.

use thiserror::Error;

use variantly_core::{
    AttributeId, AttributeValueId, TemplateAttributeLineId, TemplateAttributeValueId, TemplateId,
    VariantId,
};

use crate::model::{
    Attribute, AttributeValue, Template, TemplateAttributeLine, TemplateAttributeValue, Variant,
};

/// Result type used for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Catalog store operation error.
///
/// These are **store errors** (constraints, missing records, backend faults)
/// as opposed to the workflow's user-facing errors. `UniqueViolation` is the
/// one condition callers are expected to distinguish: it is the only store
/// failure the reconciliation workflow recovers from (via checkpoint
/// rollback); everything else propagates unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint was violated: a duplicate (line, value)
    /// pairing, a duplicate active line per (template, attribute), or two
    /// active variants of one template collapsing onto the same combination.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A checkpoint token was already rolled back, released, or never issued.
    #[error("unknown checkpoint")]
    UnknownCheckpoint,

    /// Any other backend failure. Never recovered by the workflow.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Opaque savepoint token issued by [`CatalogStore::checkpoint`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Checkpoint(u64);

impl Checkpoint {
    pub fn new(token: u64) -> Self {
        Self(token)
    }

    pub fn token(self) -> u64 {
        self.0
    }
}

/// Transactional catalog record store.
///
/// ## Mutation semantics
///
/// Each mutating call is atomic: on error the store is left as it was before
/// the call. Mutations that cascade into variant combinations
/// (`deactivate_line`, `delete_pairings`, and line-membership changes with
/// `suppress_variant_cascade = false`) validate the per-template combination
/// uniqueness constraint *after* cascading and report failures as
/// [`StoreError::UniqueViolation`].
///
/// ## Checkpoints
///
/// `checkpoint()` captures the current state and returns an opaque token;
/// `rollback()` restores that state and discards the token; `release()`
/// discards it without restoring. Tokens are single-use. This is the savepoint
/// primitive the workflow wraps around individually risky mutations so a
/// constraint violation aborts one sub-step, not the whole run.
///
/// ## Concurrency
///
/// The store serializes its own operations; concurrent reconciliations of the
/// same template from different sessions are not coordinated beyond that (the
/// uniqueness constraint catches the worst case).
pub trait CatalogStore {
    // -- reads ---------------------------------------------------------------

    fn attribute(&self, id: AttributeId) -> StoreResult<Attribute>;

    fn attribute_value(&self, id: AttributeValueId) -> StoreResult<AttributeValue>;

    fn template(&self, id: TemplateId) -> StoreResult<Template>;

    fn attribute_line(&self, id: TemplateAttributeLineId) -> StoreResult<TemplateAttributeLine>;

    fn template_attribute_value(
        &self,
        id: TemplateAttributeValueId,
    ) -> StoreResult<TemplateAttributeValue>;

    fn variant(&self, id: VariantId) -> StoreResult<Variant>;

    /// The template's *active* line for `attribute`, if any.
    fn line_for_attribute(
        &self,
        template: TemplateId,
        attribute: AttributeId,
    ) -> StoreResult<Option<TemplateAttributeLine>>;

    /// All variants of `template`; inactive ones only when asked for.
    fn variants_of_template(
        &self,
        template: TemplateId,
        include_inactive: bool,
    ) -> StoreResult<Vec<Variant>>;

    /// All *active* variants of `template` other than `excluding`.
    fn other_active_variants(
        &self,
        template: TemplateId,
        excluding: VariantId,
    ) -> StoreResult<Vec<Variant>>;

    /// Pairings on `line` whose value is in `values`.
    fn pairings_for_values(
        &self,
        line: TemplateAttributeLineId,
        values: &[AttributeValueId],
    ) -> StoreResult<Vec<TemplateAttributeValue>>;

    // -- writes --------------------------------------------------------------

    /// Create an active line on `template` seeded with `values`. Rejects a
    /// second active line for the same attribute as a unique violation. Does
    /// not materialize pairings; callers manage those explicitly.
    fn create_line(
        &self,
        template: TemplateId,
        attribute: AttributeId,
        values: Vec<AttributeValueId>,
    ) -> StoreResult<TemplateAttributeLine>;

    /// Add `value` to the line's allowed values (no-op when already a member).
    /// With `suppress_variant_cascade = false` the store also materializes the
    /// missing (line, value) pairing.
    fn add_line_value(
        &self,
        line: TemplateAttributeLineId,
        value: AttributeValueId,
        suppress_variant_cascade: bool,
    ) -> StoreResult<()>;

    /// Remove `values` from the line's allowed values. With
    /// `suppress_variant_cascade = false` the store also deletes the matching
    /// pairings, with the same cascade/uniqueness checking as
    /// [`CatalogStore::delete_pairings`].
    fn remove_line_values(
        &self,
        line: TemplateAttributeLineId,
        values: &[AttributeValueId],
        suppress_variant_cascade: bool,
    ) -> StoreResult<()>;

    /// Deactivate a line. Cascades: the line's pairings are dropped from all
    /// variant combinations, then combination uniqueness is validated.
    fn deactivate_line(&self, line: TemplateAttributeLineId) -> StoreResult<()>;

    /// Materialize the (line, value) pairing. Duplicate pairings are a unique
    /// violation; the value must be a member of the line's allowed values.
    fn create_pairing(
        &self,
        line: TemplateAttributeLineId,
        value: AttributeValueId,
    ) -> StoreResult<TemplateAttributeValue>;

    /// Delete pairings. Cascades: each pairing is dropped from any variant
    /// combination referencing it, then combination uniqueness is validated.
    fn delete_pairings(&self, ids: &[TemplateAttributeValueId]) -> StoreResult<()>;

    /// Replace a variant's combination wholesale. Validates that every pairing
    /// exists and that the resulting combination stays unique within the
    /// variant's template.
    fn set_variant_combination(
        &self,
        variant: VariantId,
        combination: Vec<TemplateAttributeValueId>,
    ) -> StoreResult<()>;

    // -- checkpoints ---------------------------------------------------------

    fn checkpoint(&self) -> StoreResult<Checkpoint>;

    fn rollback(&self, checkpoint: Checkpoint) -> StoreResult<()>;

    fn release(&self, checkpoint: Checkpoint) -> StoreResult<()>;
}
