//! Catalog records.
//!
//! These are plain store records, not aggregates: the store owns them, the
//! workflow only ever holds ids and short-lived copies obtained through
//! `CatalogStore` reads. Relations are expressed as id lists on the owning
//! side, mirroring how the backing store lays them out.

use serde::{Deserialize, Serialize};

use variantly_core::{
    AttributeId, AttributeValueId, Entity, TemplateAttributeLineId, TemplateAttributeValueId,
    TemplateId, VariantId,
};

/// A product characteristic (e.g. Color); owns an ordered set of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: AttributeId,
    pub name: String,
    /// Ordered set; membership managed by the broader catalog application.
    pub value_ids: Vec<AttributeValueId>,
}

/// One possible setting of an attribute (e.g. Red).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub id: AttributeValueId,
    pub attribute_id: AttributeId,
    pub name: String,
}

/// Shared product definition; owns attribute lines, shared by 1..N variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub line_ids: Vec<TemplateAttributeLineId>,
}

/// The allowed-value set for one attribute, scoped to one template.
///
/// At most one *active* line may exist per (template, attribute). A line whose
/// allowed-value set would become empty is deactivated rather than kept empty;
/// that invariant is enforced by the reconciliation workflow's cleanup step,
/// not by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateAttributeLine {
    pub id: TemplateAttributeLineId,
    pub template_id: TemplateId,
    pub attribute_id: AttributeId,
    /// Ordered allowed values for this attribute on this template.
    pub value_ids: Vec<AttributeValueId>,
    pub active: bool,
}

impl TemplateAttributeLine {
    pub fn allows(&self, value_id: AttributeValueId) -> bool {
        self.value_ids.contains(&value_id)
    }

    /// Allowed values that would remain after removing `values`.
    pub fn values_without(&self, values: &[AttributeValueId]) -> Vec<AttributeValueId> {
        self.value_ids
            .iter()
            .copied()
            .filter(|v| !values.contains(v))
            .collect()
    }
}

/// Materialized (line, value) pairing, the unit variants reference to express
/// "this variant has this value". Unique per (line, value), store-enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateAttributeValue {
    pub id: TemplateAttributeValueId,
    pub line_id: TemplateAttributeLineId,
    pub value_id: AttributeValueId,
}

/// A concrete, purchasable product under a template, identified by one
/// combination of pairings. The store rejects two active variants of the same
/// template holding an identical combination (set equality).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub template_id: TemplateId,
    pub name: String,
    pub combination: Vec<TemplateAttributeValueId>,
    pub active: bool,
}

impl Variant {
    pub fn references(&self, pairing_id: TemplateAttributeValueId) -> bool {
        self.combination.contains(&pairing_id)
    }
}

impl Entity for Attribute {
    type Id = AttributeId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn entity_name() -> &'static str {
        "attribute"
    }
}

impl Entity for AttributeValue {
    type Id = AttributeValueId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn entity_name() -> &'static str {
        "attribute value"
    }
}

impl Entity for Template {
    type Id = TemplateId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn entity_name() -> &'static str {
        "template"
    }
}

impl Entity for TemplateAttributeLine {
    type Id = TemplateAttributeLineId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn entity_name() -> &'static str {
        "template attribute line"
    }
}

impl Entity for TemplateAttributeValue {
    type Id = TemplateAttributeValueId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn entity_name() -> &'static str {
        "template attribute value"
    }
}

impl Entity for Variant {
    type Id = VariantId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn entity_name() -> &'static str {
        "variant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_without_preserves_order_of_survivors() {
        let keep = AttributeValueId::new();
        let drop_a = AttributeValueId::new();
        let drop_b = AttributeValueId::new();
        let line = TemplateAttributeLine {
            id: TemplateAttributeLineId::new(),
            template_id: TemplateId::new(),
            attribute_id: AttributeId::new(),
            value_ids: vec![drop_a, keep, drop_b],
            active: true,
        };

        assert_eq!(line.values_without(&[drop_a, drop_b]), vec![keep]);
        assert!(line.values_without(&[drop_a, keep, drop_b]).is_empty());
    }

    #[test]
    fn allows_checks_membership() {
        let value = AttributeValueId::new();
        let line = TemplateAttributeLine {
            id: TemplateAttributeLineId::new(),
            template_id: TemplateId::new(),
            attribute_id: AttributeId::new(),
            value_ids: vec![value],
            active: true,
        };

        assert!(line.allows(value));
        assert!(!line.allows(AttributeValueId::new()));
    }
}
