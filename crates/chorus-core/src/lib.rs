//! Domain model and sync engine for Chorus.
//!
//! Everything here is free of I/O. Storage, locks and notifiers are reached
//! through the port traits in [`sync::ports`].

pub mod config;
pub mod error;
pub mod profile;
pub mod session;
pub mod sync;

// Re-export common error type
pub use error::{ChorusError, Result};
