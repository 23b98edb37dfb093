//! SQLite-backed persistence for header mappings.
//!
//! Exposes:
//! - the [`MappingStore`] trait, the keyed get/put/delete surface the mapping manager
//!   depends on
//! - [`MappingStorage`], its SQLite implementation (schema creation, upserts keyed by the
//!   natural composite key, stable row ids)

mod schema;
pub mod storage;
mod store;

pub use storage::{MappingStorage, Result, StorageError};
pub use store::MappingStore;
