//! Strongly-typed identifiers used across the catalog domain.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// An identifier string failed to parse as a UUID.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {source}")]
pub struct ParseIdError {
    kind: &'static str,
    source: uuid::Error,
}

macro_rules! impl_uuid_id {
    ($t:ident, $name:literal) => {
        #[doc = concat!("Identifier of a ", $name, " record.")]
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s).map_err(|source| ParseIdError {
                    kind: stringify!($t),
                    source,
                })?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_id!(AttributeId, "product attribute");
impl_uuid_id!(AttributeValueId, "product attribute value");
impl_uuid_id!(TemplateId, "product template");
impl_uuid_id!(TemplateAttributeLineId, "template attribute line");
impl_uuid_id!(TemplateAttributeValueId, "template attribute value pairing");
impl_uuid_id!(VariantId, "product variant");
