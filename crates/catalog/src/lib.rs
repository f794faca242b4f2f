//! Catalog domain module.
//!
//! This crate contains the product-catalog data model (templates, variants,
//! attributes and their template-scoped lines/pairings) plus the `CatalogStore`
//! repository trait the reconciliation workflow is written against. It has no
//! IO of its own; concrete stores live in `variantly-infra`.

pub mod model;
pub mod store;

pub use model::{
    Attribute, AttributeValue, Template, TemplateAttributeLine, TemplateAttributeValue, Variant,
};
pub use store::{CatalogStore, Checkpoint, StoreError, StoreResult};

pub use variantly_core::{
    AttributeId, AttributeValueId, TemplateAttributeLineId, TemplateAttributeValueId, TemplateId,
    VariantId,
};
