//! The reconciliation wizard itself.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, warn};

use variantly_catalog::{
    AttributeId, AttributeValueId, CatalogStore, Checkpoint, StoreError, TemplateAttributeValue,
    TemplateAttributeValueId, TemplateId, Variant, VariantId,
};

use crate::action::{AttributeAction, DerivedActions, ValueAction};

/// Reconciliation workflow error.
///
/// Only `UniquenessCompromised` is meant for end users; it is produced by
/// rolling a risky mutation back to its checkpoint when the store reports a
/// uniqueness violation. Every other store failure passes through as
/// `Store` and aborts the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WizardError {
    #[error("Product '{product}' uniqueness compromised.\nImpossible to remove value(s): {values}")]
    UniquenessCompromised { product: String, values: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Wizard to change attribute values on product variants.
///
/// One instance per reconciliation run, borrowing the caller's store for the
/// run's duration. [`VariantAttributeWizard::derive_actions`] is the read
/// side (populate the action list for display/edit);
/// [`VariantAttributeWizard::apply`] is the mutation entry point.
pub struct VariantAttributeWizard<'a, S: CatalogStore> {
    store: &'a S,
}

impl<'a, S: CatalogStore> VariantAttributeWizard<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Collect the distinct attribute values present on the selected variants
    /// and produce one do-nothing action per value.
    ///
    /// Read-only and idempotent: deriving twice over an unchanged selection
    /// yields the same distinct values, and a fresh action list each time;
    /// changing `filter` re-derives, it never accumulates duplicates. With a
    /// filter, actions are produced only for values of that attribute; the
    /// distinct value and attribute lists stay unfiltered.
    pub fn derive_actions(
        &self,
        variant_ids: &[VariantId],
        filter: Option<AttributeId>,
    ) -> Result<DerivedActions, WizardError> {
        let mut distinct_variants = HashSet::new();
        let mut template_ids = Vec::new();
        let mut distinct_values = Vec::new();
        let mut seen_values = HashSet::new();
        let mut available_attributes = Vec::new();
        let mut seen_attributes = HashSet::new();

        for &variant_id in variant_ids {
            let variant = self.store.variant(variant_id)?;
            distinct_variants.insert(variant.id);
            if !template_ids.contains(&variant.template_id) {
                template_ids.push(variant.template_id);
            }
            for &pairing_id in &variant.combination {
                let pairing = self.store.template_attribute_value(pairing_id)?;
                if !seen_values.insert(pairing.value_id) {
                    continue;
                }
                let value = self.store.attribute_value(pairing.value_id)?;
                if seen_attributes.insert(value.attribute_id) {
                    available_attributes.push(value.attribute_id);
                }
                distinct_values.push(value);
            }
        }

        let actions = distinct_values
            .iter()
            .filter(|value| filter.is_none_or(|f| value.attribute_id == f))
            .map(|value| ValueAction::do_nothing(value.id, value.attribute_id))
            .collect();

        Ok(DerivedActions {
            variant_ids: variant_ids.to_vec(),
            variant_count: distinct_variants.len(),
            template_count: template_ids.len(),
            template_ids,
            distinct_value_ids: distinct_values.iter().map(|v| v.id).collect(),
            available_attribute_ids: available_attributes,
            actions,
        })
    }

    /// Apply the chosen actions to every selected variant, in caller order.
    ///
    /// Each variant is fully reconciled (actions, then orphan cleanup) before
    /// the next one is read, so "still used by another variant" always
    /// reflects the live state left by earlier variants.
    pub fn apply(
        &self,
        variant_ids: &[VariantId],
        actions: &[ValueAction],
    ) -> Result<(), WizardError> {
        for &variant_id in variant_ids {
            self.apply_to_variant(variant_id, actions)?;
        }
        Ok(())
    }

    /// Update one variant with all the actions set by the caller.
    fn apply_to_variant(
        &self,
        variant_id: VariantId,
        actions: &[ValueAction],
    ) -> Result<(), WizardError> {
        let variant = self.store.variant(variant_id)?;
        let mut combination = variant.combination.clone();
        let mut value_of: HashMap<TemplateAttributeValueId, AttributeValueId> = HashMap::new();
        for &pairing_id in &combination {
            let pairing = self.store.template_attribute_value(pairing_id)?;
            value_of.insert(pairing_id, pairing.value_id);
        }
        // Values present when the run started. Staleness is judged against
        // this snapshot, never the live combination, so an action targeting a
        // value introduced by an earlier replace in the same run is skipped
        // and the outcome does not depend on action order.
        let initial_values: HashSet<AttributeValueId> = value_of.values().copied().collect();

        // Values no longer used anywhere, batched per attribute so cleanup
        // runs once per line rather than once per value.
        let mut to_clean: BTreeMap<AttributeId, BTreeSet<AttributeValueId>> = BTreeMap::new();

        for value_action in actions {
            if value_action.action == AttributeAction::DoNothing {
                continue;
            }
            let value_id = value_action.value_id;
            if !initial_values.contains(&value_id) {
                debug!(variant = %variant_id, value = %value_id, "stale action, value not on variant");
                continue;
            }

            let mut next: Vec<TemplateAttributeValueId> = combination
                .iter()
                .copied()
                .filter(|p| value_of[p] != value_id)
                .collect();
            match value_action.action {
                AttributeAction::DoNothing => continue,
                AttributeAction::Delete => {
                    // Nothing else to do here; cleanup below decides whether
                    // the value is stripped from the template too.
                }
                AttributeAction::Replace => {
                    let Some(replacement) = value_action.replaced_by else {
                        debug!(value = %value_id, "replace action without target, skipped");
                        continue;
                    };
                    let pairing = self.ensure_replacement(variant.template_id, replacement)?;
                    if !next.contains(&pairing.id) {
                        next.push(pairing.id);
                    }
                    value_of.insert(pairing.id, pairing.value_id);
                }
            }

            // Writing the shrunk combination can collapse this variant onto a
            // sibling's combination, so it runs under checkpoint protection.
            let conflict = self.uniqueness_error(&variant, &[value_id])?;
            self.guard_unique(
                || {
                    self.store
                        .set_variant_combination(variant_id, next.clone())
                },
                conflict,
            )?;
            combination = next;

            if !self.value_used_elsewhere(&variant, value_id)? {
                // The value record, not the action, decides which line gets
                // cleaned; a mis-filled action must not aim at another line.
                let attribute_id = self.store.attribute_value(value_id)?.attribute_id;
                to_clean.entry(attribute_id).or_default().insert(value_id);
            }
        }

        if !to_clean.is_empty() {
            self.cleanup_attribute_values(&variant, &to_clean)?;
        }
        Ok(())
    }

    /// Ensure the template can carry `replacement`: an active line for its
    /// attribute (created seeded with the value if missing), membership of the
    /// value on that line, and exactly one (line, value) pairing, which is
    /// returned.
    ///
    /// Line and membership changes are template-scoped and therefore visible
    /// to every variant sharing the template, not only the one being
    /// reconciled.
    fn ensure_replacement(
        &self,
        template_id: TemplateId,
        replacement: AttributeValueId,
    ) -> Result<TemplateAttributeValue, WizardError> {
        let value = self.store.attribute_value(replacement)?;
        let line = match self
            .store
            .line_for_attribute(template_id, value.attribute_id)?
        {
            Some(line) => {
                // Suppress the store's pairing cascade; the pairing is
                // located or created explicitly below.
                self.store.add_line_value(line.id, replacement, true)?;
                line
            }
            None => self
                .store
                .create_line(template_id, value.attribute_id, vec![replacement])?,
        };

        match self
            .store
            .pairings_for_values(line.id, &[replacement])?
            .into_iter()
            .next()
        {
            Some(pairing) => Ok(pairing),
            None => Ok(self.store.create_pairing(line.id, replacement)?),
        }
    }

    /// Is `value_id` part of any *other* active variant of the same template?
    /// Fresh query against the live state, excluding the variant at hand.
    fn value_used_elsewhere(
        &self,
        variant: &Variant,
        value_id: AttributeValueId,
    ) -> Result<bool, WizardError> {
        let others = self
            .store
            .other_active_variants(variant.template_id, variant.id)?;
        for other in others {
            for &pairing_id in &other.combination {
                if self.store.template_attribute_value(pairing_id)?.value_id == value_id {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Strip orphaned values from the template, one pass per attribute.
    ///
    /// A line that would end up with no allowed values is deactivated instead
    /// of being left empty. Deactivation and pairing deletion can both trip
    /// the combination-uniqueness constraint through their cascades, so each
    /// runs under checkpoint protection.
    fn cleanup_attribute_values(
        &self,
        variant: &Variant,
        to_clean: &BTreeMap<AttributeId, BTreeSet<AttributeValueId>>,
    ) -> Result<(), WizardError> {
        for (&attribute_id, values) in to_clean {
            let Some(line) = self
                .store
                .line_for_attribute(variant.template_id, attribute_id)?
            else {
                // Already gone (e.g. deactivated while reconciling an earlier
                // variant of the same template).
                continue;
            };
            let values: Vec<AttributeValueId> = values.iter().copied().collect();
            let conflict = self.uniqueness_error(variant, &values)?;

            if line.values_without(&values).is_empty() {
                self.guard_unique(|| self.store.deactivate_line(line.id), conflict.clone())?;
            }
            self.store.remove_line_values(line.id, &values, true)?;

            let pairing_ids: Vec<TemplateAttributeValueId> = self
                .store
                .pairings_for_values(line.id, &values)?
                .iter()
                .map(|p| p.id)
                .collect();
            if !pairing_ids.is_empty() {
                self.guard_unique(|| self.store.delete_pairings(&pairing_ids), conflict)?;
            }
        }
        Ok(())
    }

    /// Run one risky mutation under a checkpoint. A unique violation rolls
    /// back to the checkpoint and surfaces as `conflict`; any other failure
    /// propagates unchanged.
    fn guard_unique(
        &self,
        op: impl FnOnce() -> Result<(), StoreError>,
        conflict: WizardError,
    ) -> Result<(), WizardError> {
        let checkpoint = self.store.checkpoint()?;
        match op() {
            Ok(()) => {
                self.release_quietly(checkpoint);
                Ok(())
            }
            Err(StoreError::UniqueViolation(detail)) => {
                warn!(%detail, "uniqueness conflict, rolling back sub-step");
                self.store.rollback(checkpoint)?;
                Err(conflict)
            }
            Err(err) => {
                self.release_quietly(checkpoint);
                Err(err.into())
            }
        }
    }

    /// Releasing a checkpoint must never override the guarded operation's
    /// outcome; a failed release is logged and dropped.
    fn release_quietly(&self, checkpoint: Checkpoint) {
        if let Err(err) = self.store.release(checkpoint) {
            warn!(%err, "failed to release checkpoint");
        }
    }

    /// User-facing message naming the product and the value(s) that could not
    /// be removed. Built eagerly (it reads value names) before the guarded
    /// mutation runs.
    fn uniqueness_error(
        &self,
        variant: &Variant,
        values: &[AttributeValueId],
    ) -> Result<WizardError, WizardError> {
        let mut names = Vec::with_capacity(values.len());
        for &value_id in values {
            names.push(self.store.attribute_value(value_id)?.name);
        }
        Ok(WizardError::UniquenessCompromised {
            product: variant.name.clone(),
            values: names.join(", "),
        })
    }
}
