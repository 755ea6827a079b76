//! Durable document stores used by the persistence adapter.

pub mod traits;
pub mod memory;
pub mod file;

pub use traits::{DocumentStore, StorageError};
pub use memory::MemoryDocumentStore;
pub use file::FileDocumentStore;
