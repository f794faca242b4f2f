//! `variantly-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod id;

pub use entity::Entity;
pub use id::{
    AttributeId, AttributeValueId, ParseIdError, TemplateAttributeLineId, TemplateAttributeValueId,
    TemplateId, VariantId,
};
