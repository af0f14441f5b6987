//! Configuration Layer

pub mod loader;

pub use loader::{load_config, Config, ConfigError, DedupeSection};
