//! Durable store adapters.

pub mod atomic_file;
pub mod file_store;
pub mod memory_store;
pub mod tiered_store;

pub use atomic_file::AtomicFile;
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use tiered_store::TieredStore;
