//! Wizard-transient value actions.
//!
//! A [`ValueAction`] pairs one attribute value present on the selected
//! variants with the user's intent for it. Actions live only for the duration
//! of one reconciliation run; they are re-derived from the live selection,
//! never persisted.

use serde::{Deserialize, Serialize};

use variantly_core::{AttributeId, AttributeValueId, TemplateId, VariantId};

/// What to do with one attribute value on the selected variants.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeAction {
    DoNothing,
    Delete,
    Replace,
}

/// User intent for one attribute value.
///
/// `replaced_by` is only meaningful for [`AttributeAction::Replace`]; a
/// replace action without a target is skipped during apply (caller input
/// defect, not surfaced).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueAction {
    pub value_id: AttributeValueId,
    pub attribute_id: AttributeId,
    pub action: AttributeAction,
    pub replaced_by: Option<AttributeValueId>,
}

impl ValueAction {
    pub fn do_nothing(value_id: AttributeValueId, attribute_id: AttributeId) -> Self {
        Self {
            value_id,
            attribute_id,
            action: AttributeAction::DoNothing,
            replaced_by: None,
        }
    }

    pub fn delete(value_id: AttributeValueId, attribute_id: AttributeId) -> Self {
        Self {
            value_id,
            attribute_id,
            action: AttributeAction::Delete,
            replaced_by: None,
        }
    }

    pub fn replace(
        value_id: AttributeValueId,
        attribute_id: AttributeId,
        replaced_by: AttributeValueId,
    ) -> Self {
        Self {
            value_id,
            attribute_id,
            action: AttributeAction::Replace,
            replaced_by: Some(replaced_by),
        }
    }
}

/// Read-side output of action derivation: what the caller shows and edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedActions {
    /// The selection, in caller order.
    pub variant_ids: Vec<VariantId>,
    /// Distinct selected variants.
    pub variant_count: usize,
    /// Distinct templates behind the selection.
    pub template_count: usize,
    /// Distinct templates behind the selection, first-seen order.
    pub template_ids: Vec<TemplateId>,
    /// Distinct attribute values across the selection, first-seen order.
    pub distinct_value_ids: Vec<AttributeValueId>,
    /// Distinct owning attributes, first-seen order (filter candidates).
    pub available_attribute_ids: Vec<AttributeId>,
    /// One fresh do-nothing action per distinct (filter-matching) value.
    pub actions: Vec<ValueAction>,
}
