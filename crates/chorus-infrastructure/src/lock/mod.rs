//! Exclusivity lock implementations.

pub mod file_lock;
pub mod local_lock;
pub mod ttl_lock;

pub use file_lock::FileLock;
pub use local_lock::LocalLock;
pub use ttl_lock::{TtlLock, lock_record_key};
