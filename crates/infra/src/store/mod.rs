//! Catalog store implementations.

pub mod in_memory;

pub use in_memory::InMemoryCatalogStore;
