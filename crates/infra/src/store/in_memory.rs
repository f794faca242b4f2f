use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockWriteGuard};

use variantly_catalog::{
    Attribute, AttributeId, AttributeValue, AttributeValueId, CatalogStore, Checkpoint, StoreError,
    StoreResult, Template, TemplateAttributeLine, TemplateAttributeLineId, TemplateAttributeValue,
    TemplateAttributeValueId, TemplateId, Variant, VariantId,
};
use variantly_core::Entity;

/// One record table, keyed by entity id.
#[derive(Debug, Clone)]
struct Table<T: Entity> {
    rows: HashMap<T::Id, T>,
}

impl<T: Entity> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }
}

impl<T: Entity + Clone> Table<T> {
    fn get(&self, id: T::Id) -> StoreResult<T> {
        self.rows
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{} {:?}", T::entity_name(), id)))
    }

    fn get_mut(&mut self, id: T::Id) -> StoreResult<&mut T> {
        self.rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("{} {:?}", T::entity_name(), id)))
    }

    fn contains(&self, id: T::Id) -> bool {
        self.rows.contains_key(&id)
    }

    fn insert(&mut self, row: T) {
        self.rows.insert(row.id(), row);
    }

    fn remove(&mut self, id: T::Id) -> StoreResult<T> {
        self.rows
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("{} {:?}", T::entity_name(), id)))
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }
}

/// Full catalog state; cloned wholesale for checkpoints and per-op atomicity.
#[derive(Debug, Clone, Default)]
struct State {
    attributes: Table<Attribute>,
    attribute_values: Table<AttributeValue>,
    templates: Table<Template>,
    lines: Table<TemplateAttributeLine>,
    pairings: Table<TemplateAttributeValue>,
    variants: Table<Variant>,
}

impl State {
    /// Variants of a template, sorted by id (v7 ids sort in creation order).
    fn template_variants(&self, template: TemplateId, include_inactive: bool) -> Vec<Variant> {
        let mut variants: Vec<Variant> = self
            .variants
            .values()
            .filter(|v| v.template_id == template && (include_inactive || v.active))
            .cloned()
            .collect();
        variants.sort_by_key(|v| v.id);
        variants
    }

    fn active_line_for(
        &self,
        template: TemplateId,
        attribute: AttributeId,
    ) -> Option<TemplateAttributeLine> {
        let mut lines: Vec<&TemplateAttributeLine> = self
            .lines
            .values()
            .filter(|l| l.template_id == template && l.attribute_id == attribute && l.active)
            .collect();
        lines.sort_by_key(|l| l.id);
        lines.first().map(|l| (*l).clone())
    }

    /// No two active variants of `template` may share a combination (set
    /// equality over pairing ids).
    fn assert_combinations_unique(&self, template: TemplateId) -> StoreResult<()> {
        let mut seen: HashMap<BTreeSet<TemplateAttributeValueId>, String> = HashMap::new();
        for variant in self.template_variants(template, false) {
            let key: BTreeSet<TemplateAttributeValueId> =
                variant.combination.iter().copied().collect();
            if let Some(earlier) = seen.insert(key, variant.name.clone()) {
                return Err(StoreError::UniqueViolation(format!(
                    "variants '{}' and '{}' share the same attribute combination",
                    earlier, variant.name
                )));
            }
        }
        Ok(())
    }

    /// Drop `pairing_ids` from every variant combination referencing them and
    /// return the templates whose variants changed.
    fn strip_pairings_from_variants(
        &mut self,
        pairing_ids: &[TemplateAttributeValueId],
    ) -> HashSet<TemplateId> {
        let mut affected = HashSet::new();
        for variant in self.variants.rows.values_mut() {
            let before = variant.combination.len();
            variant.combination.retain(|p| !pairing_ids.contains(p));
            if variant.combination.len() != before {
                affected.insert(variant.template_id);
            }
        }
        affected
    }

    /// Delete pairing rows, cascade them out of variant combinations, then
    /// validate combination uniqueness on every touched template.
    fn delete_pairings(&mut self, ids: &[TemplateAttributeValueId]) -> StoreResult<()> {
        let mut affected = HashSet::new();
        for &id in ids {
            let pairing = self.pairings.remove(id)?;
            let line = self.lines.get(pairing.line_id)?;
            affected.insert(line.template_id);
        }
        affected.extend(self.strip_pairings_from_variants(ids));
        for template in affected {
            self.assert_combinations_unique(template)?;
        }
        Ok(())
    }

    fn pairings_of_line(&self, line: TemplateAttributeLineId) -> Vec<TemplateAttributeValue> {
        let mut pairings: Vec<TemplateAttributeValue> = self
            .pairings
            .values()
            .filter(|p| p.line_id == line)
            .cloned()
            .collect();
        pairings.sort_by_key(|p| p.id);
        pairings
    }

    fn assert_value_of_attribute(
        &self,
        value: AttributeValueId,
        attribute: AttributeId,
    ) -> StoreResult<()> {
        let value = self.attribute_values.get(value)?;
        if value.attribute_id != attribute {
            return Err(StoreError::Backend(format!(
                "value '{}' does not belong to attribute {:?}",
                value.name, attribute
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: State,
    checkpoints: HashMap<u64, State>,
    next_checkpoint: u64,
}

/// In-memory transactional catalog store.
///
/// Intended for tests/dev. Every mutating call is atomic (applied to a draft
/// copy of the state, committed only on success) and checkpoints are whole
/// state snapshots, so rollback restores exactly the captured state. Rolling
/// back to a checkpoint discards every checkpoint taken after it, matching
/// nested savepoint semantics.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    inner: RwLock<Inner>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn read_state<T>(&self, f: impl FnOnce(&State) -> StoreResult<T>) -> StoreResult<T> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        f(&inner.state)
    }

    /// Apply a mutation to a draft copy of the state; commit only on success.
    fn mutate<T>(&self, f: impl FnOnce(&mut State) -> StoreResult<T>) -> StoreResult<T> {
        let mut inner = self.write()?;
        let mut draft = inner.state.clone();
        let out = f(&mut draft)?;
        inner.state = draft;
        Ok(out)
    }

    // -- catalog application surface (long-lived records) --------------------
    //
    // Attribute/value/template/variant lifecycle belongs to the broader
    // catalog application, not to the reconciliation workflow; these helpers
    // stand in for it when seeding a store.

    pub fn add_attribute(&self, name: &str) -> StoreResult<Attribute> {
        self.mutate(|state| {
            let attribute = Attribute {
                id: AttributeId::new(),
                name: name.to_string(),
                value_ids: Vec::new(),
            };
            state.attributes.insert(attribute.clone());
            Ok(attribute)
        })
    }

    pub fn add_attribute_value(
        &self,
        attribute: AttributeId,
        name: &str,
    ) -> StoreResult<AttributeValue> {
        self.mutate(|state| {
            let value = AttributeValue {
                id: AttributeValueId::new(),
                attribute_id: attribute,
                name: name.to_string(),
            };
            state.attributes.get_mut(attribute)?.value_ids.push(value.id);
            state.attribute_values.insert(value.clone());
            Ok(value)
        })
    }

    pub fn add_template(&self, name: &str) -> StoreResult<Template> {
        self.mutate(|state| {
            let template = Template {
                id: TemplateId::new(),
                name: name.to_string(),
                line_ids: Vec::new(),
            };
            state.templates.insert(template.clone());
            Ok(template)
        })
    }

    /// Create an active variant holding `combination`. Validates the pairings
    /// and the combination-uniqueness constraint like any other write.
    pub fn add_variant(
        &self,
        template: TemplateId,
        name: &str,
        combination: Vec<TemplateAttributeValueId>,
    ) -> StoreResult<Variant> {
        self.mutate(|state| {
            if !state.templates.contains(template) {
                return Err(StoreError::NotFound(format!("template {template:?}")));
            }
            for &pairing_id in &combination {
                let pairing = state.pairings.get(pairing_id)?;
                let line = state.lines.get(pairing.line_id)?;
                if line.template_id != template {
                    return Err(StoreError::Backend(format!(
                        "pairing {pairing_id:?} belongs to another template"
                    )));
                }
            }
            let variant = Variant {
                id: VariantId::new(),
                template_id: template,
                name: name.to_string(),
                combination,
                active: true,
            };
            state.variants.insert(variant.clone());
            state.assert_combinations_unique(template)?;
            Ok(variant)
        })
    }

    pub fn deactivate_variant(&self, variant: VariantId) -> StoreResult<()> {
        self.mutate(|state| {
            state.variants.get_mut(variant)?.active = false;
            Ok(())
        })
    }
}

impl CatalogStore for InMemoryCatalogStore {
    fn attribute(&self, id: AttributeId) -> StoreResult<Attribute> {
        self.read_state(|state| state.attributes.get(id))
    }

    fn attribute_value(&self, id: AttributeValueId) -> StoreResult<AttributeValue> {
        self.read_state(|state| state.attribute_values.get(id))
    }

    fn template(&self, id: TemplateId) -> StoreResult<Template> {
        self.read_state(|state| state.templates.get(id))
    }

    fn attribute_line(&self, id: TemplateAttributeLineId) -> StoreResult<TemplateAttributeLine> {
        self.read_state(|state| state.lines.get(id))
    }

    fn template_attribute_value(
        &self,
        id: TemplateAttributeValueId,
    ) -> StoreResult<TemplateAttributeValue> {
        self.read_state(|state| state.pairings.get(id))
    }

    fn variant(&self, id: VariantId) -> StoreResult<Variant> {
        self.read_state(|state| state.variants.get(id))
    }

    fn line_for_attribute(
        &self,
        template: TemplateId,
        attribute: AttributeId,
    ) -> StoreResult<Option<TemplateAttributeLine>> {
        self.read_state(|state| {
            if !state.templates.contains(template) {
                return Err(StoreError::NotFound(format!("template {template:?}")));
            }
            Ok(state.active_line_for(template, attribute))
        })
    }

    fn variants_of_template(
        &self,
        template: TemplateId,
        include_inactive: bool,
    ) -> StoreResult<Vec<Variant>> {
        self.read_state(|state| {
            if !state.templates.contains(template) {
                return Err(StoreError::NotFound(format!("template {template:?}")));
            }
            Ok(state.template_variants(template, include_inactive))
        })
    }

    fn other_active_variants(
        &self,
        template: TemplateId,
        excluding: VariantId,
    ) -> StoreResult<Vec<Variant>> {
        self.read_state(|state| {
            Ok(state
                .template_variants(template, false)
                .into_iter()
                .filter(|v| v.id != excluding)
                .collect())
        })
    }

    fn pairings_for_values(
        &self,
        line: TemplateAttributeLineId,
        values: &[AttributeValueId],
    ) -> StoreResult<Vec<TemplateAttributeValue>> {
        self.read_state(|state| {
            if !state.lines.contains(line) {
                return Err(StoreError::NotFound(format!(
                    "template attribute line {line:?}"
                )));
            }
            Ok(state
                .pairings_of_line(line)
                .into_iter()
                .filter(|p| values.contains(&p.value_id))
                .collect())
        })
    }

    fn create_line(
        &self,
        template: TemplateId,
        attribute: AttributeId,
        values: Vec<AttributeValueId>,
    ) -> StoreResult<TemplateAttributeLine> {
        self.mutate(|state| {
            if !state.templates.contains(template) {
                return Err(StoreError::NotFound(format!("template {template:?}")));
            }
            if !state.attributes.contains(attribute) {
                return Err(StoreError::NotFound(format!("attribute {attribute:?}")));
            }
            if values.is_empty() {
                return Err(StoreError::Backend(
                    "cannot create an attribute line without values".to_string(),
                ));
            }
            for &value in &values {
                state.assert_value_of_attribute(value, attribute)?;
            }
            if state.active_line_for(template, attribute).is_some() {
                return Err(StoreError::UniqueViolation(format!(
                    "template {template:?} already has an active line for attribute {attribute:?}"
                )));
            }
            let line = TemplateAttributeLine {
                id: TemplateAttributeLineId::new(),
                template_id: template,
                attribute_id: attribute,
                value_ids: values,
                active: true,
            };
            state.templates.get_mut(template)?.line_ids.push(line.id);
            state.lines.insert(line.clone());
            Ok(line)
        })
    }

    fn add_line_value(
        &self,
        line: TemplateAttributeLineId,
        value: AttributeValueId,
        suppress_variant_cascade: bool,
    ) -> StoreResult<()> {
        self.mutate(|state| {
            let attribute = state.lines.get(line)?.attribute_id;
            state.assert_value_of_attribute(value, attribute)?;
            let row = state.lines.get_mut(line)?;
            if !row.value_ids.contains(&value) {
                row.value_ids.push(value);
            }
            if !suppress_variant_cascade
                && !state
                    .pairings
                    .values()
                    .any(|p| p.line_id == line && p.value_id == value)
            {
                state.pairings.insert(TemplateAttributeValue {
                    id: TemplateAttributeValueId::new(),
                    line_id: line,
                    value_id: value,
                });
            }
            Ok(())
        })
    }

    fn remove_line_values(
        &self,
        line: TemplateAttributeLineId,
        values: &[AttributeValueId],
        suppress_variant_cascade: bool,
    ) -> StoreResult<()> {
        self.mutate(|state| {
            let row = state.lines.get_mut(line)?;
            row.value_ids.retain(|v| !values.contains(v));
            if !suppress_variant_cascade {
                let doomed: Vec<TemplateAttributeValueId> = state
                    .pairings_of_line(line)
                    .into_iter()
                    .filter(|p| values.contains(&p.value_id))
                    .map(|p| p.id)
                    .collect();
                if !doomed.is_empty() {
                    state.delete_pairings(&doomed)?;
                }
            }
            Ok(())
        })
    }

    fn deactivate_line(&self, line: TemplateAttributeLineId) -> StoreResult<()> {
        self.mutate(|state| {
            let row = state.lines.get_mut(line)?;
            row.active = false;
            let template = row.template_id;
            let pairing_ids: Vec<TemplateAttributeValueId> =
                state.pairings_of_line(line).iter().map(|p| p.id).collect();
            state.strip_pairings_from_variants(&pairing_ids);
            state.assert_combinations_unique(template)?;
            Ok(())
        })
    }

    fn create_pairing(
        &self,
        line: TemplateAttributeLineId,
        value: AttributeValueId,
    ) -> StoreResult<TemplateAttributeValue> {
        self.mutate(|state| {
            let row = state.lines.get(line)?;
            if !row.allows(value) {
                return Err(StoreError::Backend(format!(
                    "value {value:?} is not an allowed value of line {line:?}"
                )));
            }
            if state
                .pairings
                .values()
                .any(|p| p.line_id == line && p.value_id == value)
            {
                return Err(StoreError::UniqueViolation(format!(
                    "pairing for line {line:?} and value {value:?} already exists"
                )));
            }
            let pairing = TemplateAttributeValue {
                id: TemplateAttributeValueId::new(),
                line_id: line,
                value_id: value,
            };
            state.pairings.insert(pairing.clone());
            Ok(pairing)
        })
    }

    fn delete_pairings(&self, ids: &[TemplateAttributeValueId]) -> StoreResult<()> {
        self.mutate(|state| state.delete_pairings(ids))
    }

    fn set_variant_combination(
        &self,
        variant: VariantId,
        combination: Vec<TemplateAttributeValueId>,
    ) -> StoreResult<()> {
        self.mutate(|state| {
            let template = state.variants.get(variant)?.template_id;
            for &pairing_id in &combination {
                let pairing = state.pairings.get(pairing_id)?;
                let line = state.lines.get(pairing.line_id)?;
                if line.template_id != template {
                    return Err(StoreError::Backend(format!(
                        "pairing {pairing_id:?} belongs to another template"
                    )));
                }
            }
            state.variants.get_mut(variant)?.combination = combination;
            state.assert_combinations_unique(template)?;
            Ok(())
        })
    }

    fn checkpoint(&self) -> StoreResult<Checkpoint> {
        let mut inner = self.write()?;
        let token = inner.next_checkpoint;
        inner.next_checkpoint += 1;
        let snapshot = inner.state.clone();
        inner.checkpoints.insert(token, snapshot);
        Ok(Checkpoint::new(token))
    }

    fn rollback(&self, checkpoint: Checkpoint) -> StoreResult<()> {
        let mut inner = self.write()?;
        let snapshot = inner
            .checkpoints
            .remove(&checkpoint.token())
            .ok_or(StoreError::UnknownCheckpoint)?;
        inner.state = snapshot;
        // Rolling back to an outer savepoint invalidates the inner ones.
        inner.checkpoints.retain(|&t, _| t < checkpoint.token());
        Ok(())
    }

    fn release(&self, checkpoint: Checkpoint) -> StoreResult<()> {
        let mut inner = self.write()?;
        inner
            .checkpoints
            .remove(&checkpoint.token())
            .ok_or(StoreError::UnknownCheckpoint)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        store: InMemoryCatalogStore,
        template: TemplateId,
        color: AttributeId,
        red: AttributeValueId,
        blue: AttributeValueId,
        line: TemplateAttributeLineId,
        red_pairing: TemplateAttributeValueId,
        blue_pairing: TemplateAttributeValueId,
    }

    fn fixture() -> Fixture {
        let store = InMemoryCatalogStore::new();
        let color = store.add_attribute("Color").unwrap();
        let red = store.add_attribute_value(color.id, "Red").unwrap();
        let blue = store.add_attribute_value(color.id, "Blue").unwrap();
        let template = store.add_template("Shirt").unwrap();
        let line = store
            .create_line(template.id, color.id, vec![red.id, blue.id])
            .unwrap();
        let red_pairing = store.create_pairing(line.id, red.id).unwrap();
        let blue_pairing = store.create_pairing(line.id, blue.id).unwrap();
        Fixture {
            store,
            template: template.id,
            color: color.id,
            red: red.id,
            blue: blue.id,
            line: line.id,
            red_pairing: red_pairing.id,
            blue_pairing: blue_pairing.id,
        }
    }

    #[test]
    fn duplicate_pairing_is_a_unique_violation() {
        let f = fixture();
        let err = f.store.create_pairing(f.line, f.red).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[test]
    fn duplicate_active_line_per_attribute_is_a_unique_violation() {
        let f = fixture();
        let err = f
            .store
            .create_line(f.template, f.color, vec![f.red])
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[test]
    fn identical_variant_combinations_are_rejected() {
        let f = fixture();
        f.store
            .add_variant(f.template, "Shirt Red", vec![f.red_pairing])
            .unwrap();
        let err = f
            .store
            .add_variant(f.template, "Shirt Red Again", vec![f.red_pairing])
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[test]
    fn set_variant_combination_enforces_uniqueness_and_rolls_back() {
        let f = fixture();
        let v1 = f
            .store
            .add_variant(f.template, "Shirt Red", vec![f.red_pairing])
            .unwrap();
        f.store
            .add_variant(f.template, "Shirt Blue", vec![f.blue_pairing])
            .unwrap();

        let err = f
            .store
            .set_variant_combination(v1.id, vec![f.blue_pairing])
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
        // Failed mutation must not leak: v1 still holds Red.
        assert_eq!(f.store.variant(v1.id).unwrap().combination, vec![f.red_pairing]);
    }

    #[test]
    fn delete_pairings_cascades_out_of_combinations() {
        let f = fixture();
        let v1 = f
            .store
            .add_variant(f.template, "Shirt Red", vec![f.red_pairing])
            .unwrap();
        f.store.delete_pairings(&[f.red_pairing]).unwrap();
        assert!(f.store.variant(v1.id).unwrap().combination.is_empty());
        assert!(matches!(
            f.store.template_attribute_value(f.red_pairing),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn deactivate_line_strips_its_pairings_from_variants() {
        let f = fixture();
        let v1 = f
            .store
            .add_variant(f.template, "Shirt Red", vec![f.red_pairing])
            .unwrap();
        f.store.deactivate_line(f.line).unwrap();
        assert!(f.store.variant(v1.id).unwrap().combination.is_empty());
        assert!(f
            .store
            .line_for_attribute(f.template, f.color)
            .unwrap()
            .is_none());
    }

    #[test]
    fn remove_line_values_cascade_follows_suppress_flag() {
        let f = fixture();

        // Suppressed: membership shrinks, pairing rows stay.
        f.store.remove_line_values(f.line, &[f.red], true).unwrap();
        assert!(f.store.template_attribute_value(f.red_pairing).is_ok());
        assert_eq!(
            f.store.attribute_line(f.line).unwrap().value_ids,
            vec![f.blue]
        );

        // Cascading: the matching pairing is deleted too.
        f.store.remove_line_values(f.line, &[f.blue], false).unwrap();
        assert!(matches!(
            f.store.template_attribute_value(f.blue_pairing),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn add_line_value_cascade_materializes_pairing() {
        let f = fixture();
        let green = f.store.add_attribute_value(f.color, "Green").unwrap();

        f.store.add_line_value(f.line, green.id, true).unwrap();
        assert!(f
            .store
            .pairings_for_values(f.line, &[green.id])
            .unwrap()
            .is_empty());

        f.store.add_line_value(f.line, green.id, false).unwrap();
        assert_eq!(
            f.store
                .pairings_for_values(f.line, &[green.id])
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn rollback_restores_snapshot_and_consumes_token() {
        let f = fixture();
        let checkpoint = f.store.checkpoint().unwrap();
        f.store.delete_pairings(&[f.red_pairing]).unwrap();
        f.store.rollback(checkpoint).unwrap();

        assert!(f.store.template_attribute_value(f.red_pairing).is_ok());
        assert!(matches!(
            f.store.rollback(checkpoint),
            Err(StoreError::UnknownCheckpoint)
        ));
    }

    #[test]
    fn rollback_discards_inner_checkpoints() {
        let f = fixture();
        let outer = f.store.checkpoint().unwrap();
        let inner = f.store.checkpoint().unwrap();
        f.store.rollback(outer).unwrap();
        assert!(matches!(
            f.store.release(inner),
            Err(StoreError::UnknownCheckpoint)
        ));
    }

    #[test]
    fn release_discards_without_restoring() {
        let f = fixture();
        let checkpoint = f.store.checkpoint().unwrap();
        f.store.remove_line_values(f.line, &[f.red], true).unwrap();
        f.store.release(checkpoint).unwrap();
        assert_eq!(
            f.store.attribute_line(f.line).unwrap().value_ids,
            vec![f.blue]
        );
    }

    #[test]
    fn uniqueness_ignores_inactive_variants() {
        let f = fixture();
        let v1 = f
            .store
            .add_variant(f.template, "Shirt Red", vec![f.red_pairing])
            .unwrap();
        f.store.deactivate_variant(v1.id).unwrap();
        // Same combination as the now-inactive variant is fine.
        f.store
            .add_variant(f.template, "Shirt Red v2", vec![f.red_pairing])
            .unwrap();
        assert_eq!(
            f.store.variants_of_template(f.template, false).unwrap().len(),
            1
        );
        assert_eq!(
            f.store.variants_of_template(f.template, true).unwrap().len(),
            2
        );
    }
}
