//! Storage backends for the engine's collaborators.
//!
//! Provides in-memory stores for testing and embedding, and JSON file stores
//! for the configuration and for the host's active-credential file.

pub mod file;
pub mod memory;

pub use file::{FileConfigStore, JsonFileCredentialStore};
pub use memory::{InMemoryConfigStore, InMemoryCredentialStore};
