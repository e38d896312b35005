//! Change notifier implementations.

pub mod broadcast_hub;
pub mod ping_notifier;

pub use broadcast_hub::BroadcastHub;
pub use ping_notifier::{PingNotifier, ping_record_key};
