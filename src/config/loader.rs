//! Configuration loading and discovery for `spriter.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::SpriterConfig;
use crate::filter::IncludeMode;
use crate::pack::PackAlgorithm;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file looked up by [`find_config`].
pub const CONFIG_FILE_NAME: &str = "spriter.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse spriter.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override output directory for rewritten CSS
    pub out_dir: Option<PathBuf>,
    /// Override where the sheet is saved
    pub sprite_sheet: Option<PathBuf>,
    /// Skip saving the sheet entirely
    pub no_sheet: bool,
    /// Override the sheet reference written into the CSS
    pub sheet_reference: Option<String>,
    pub include_mode: Option<IncludeMode>,
    /// Override `silent` (false fails on missing images)
    pub silent: Option<bool>,
    /// Override image existence checks
    pub verify_images: Option<bool>,
    /// Treat parse warnings as errors
    pub strict_parse: Option<bool>,
    pub algorithm: Option<PackAlgorithm>,
    pub padding: Option<u32>,
}

/// Find spriter.toml by walking up from the current working directory.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Find spriter.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a spriter.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses [`find_config`]
/// to locate one. If no config file is found, returns the default configuration.
///
/// # Example
/// ```ignore
/// let config = load_config(None)?;
/// let config = load_config(Some(Path::new("site/spriter.toml")))?;
/// ```
pub fn load_config(path: Option<&Path>) -> Result<SpriterConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

fn load_config_file(path: &Path) -> Result<SpriterConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let mut config: SpriterConfig = toml::from_str(&contents)?;
    config.normalize();

    validate(&config)?;
    log::debug!("loaded configuration from {}", path.display());
    Ok(config)
}

fn validate(config: &SpriterConfig) -> Result<(), ConfigError> {
    let errors = config.validate();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()))
    }
}

/// Configuration used when no spriter.toml is found.
pub fn default_config() -> SpriterConfig {
    SpriterConfig::default()
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values. The merged result is
/// validated again, since an override can blank out a required value.
///
/// # Example
/// ```ignore
/// let mut config = load_config(None)?;
/// let overrides = CliOverrides { padding: Some(2), ..Default::default() };
/// merge_cli_overrides(&mut config, &overrides)?;
/// ```
pub fn merge_cli_overrides(
    config: &mut SpriterConfig,
    overrides: &CliOverrides,
) -> Result<(), ConfigError> {
    if let Some(ref out_dir) = overrides.out_dir {
        config.output.out_dir = out_dir.clone();
    }

    if overrides.no_sheet {
        config.sprite.sprite_sheet = None;
    } else if let Some(ref sheet) = overrides.sprite_sheet {
        config.sprite.sprite_sheet = Some(sheet.clone());
    }

    if let Some(ref reference) = overrides.sheet_reference {
        config.sprite.path_to_sprite_sheet_from_css = reference.clone();
    }
    if let Some(mode) = overrides.include_mode {
        config.sprite.include_mode = mode;
    }
    if let Some(silent) = overrides.silent {
        config.sprite.silent = silent;
    }
    if let Some(verify) = overrides.verify_images {
        config.sprite.should_verify_images_exist = verify;
    }
    if let Some(strict) = overrides.strict_parse {
        config.sprite.strict_parse = strict;
    }
    if let Some(algorithm) = overrides.algorithm {
        config.sprite.packer.algorithm = algorithm;
    }
    if let Some(padding) = overrides.padding {
        config.sprite.packer.padding = padding;
    }

    config.normalize();
    validate(config)
}
