//! Configuration for sprite batches
//!
//! Provides the option types and `spriter.toml` discovery and loading.

pub mod loader;
pub mod schema;

pub use loader::{
    default_config, find_config, find_config_from, load_config, merge_cli_overrides, CliOverrides,
    ConfigError, CONFIG_FILE_NAME,
};
pub use schema::*;
