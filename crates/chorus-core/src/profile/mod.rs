pub mod model;

pub use model::{PersistedProfiles, Profile, ProfileSnapshot};
