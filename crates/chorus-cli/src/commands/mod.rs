pub mod config;
pub mod inspect;
pub mod sessions;
pub mod utils;
pub mod watch;
