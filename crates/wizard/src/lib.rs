//! Variant attribute reconciliation workflow.
//!
//! A wizard that reconciles user-selected attribute-value actions (delete,
//! replace, do-nothing) across a set of product variants, keeping the shared
//! template's attribute lines consistent for all sibling variants: values no
//! longer used by any variant are stripped from the template, a line left with
//! no values is deactivated instead, and every destructive step is guarded
//! against the store's combination-uniqueness constraint via checkpoint
//! rollback.
//!
//! The workflow is request-scoped and store-agnostic: it holds a reference to
//! a [`variantly_catalog::CatalogStore`] for the duration of one run and owns
//! no catalog data itself.

pub mod action;
pub mod wizard;

pub use action::{AttributeAction, DerivedActions, ValueAction};
pub use wizard::{VariantAttributeWizard, WizardError};
