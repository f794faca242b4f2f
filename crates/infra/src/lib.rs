//! Infrastructure layer: concrete catalog stores.

pub mod store;

pub use store::InMemoryCatalogStore;
