//! Configuration schema types for `spriter.toml`
//!
//! Defines the spriter options and the validation rules applied after loading.

use crate::filter::IncludeMode;
use crate::pack::{PackedSheet, PackerOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Called with the packed sheet once it has been built.
pub type BuildCallback = Arc<dyn Fn(&PackedSheet) + Send + Sync>;

/// Options for one sprite batch.
///
/// camelCase spellings of the option names are accepted as aliases.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SpriterOptions {
    /// `implicit` or `explicit` inclusion policy
    #[serde(default, alias = "includeMode")]
    pub include_mode: IncludeMode,
    /// Where the packed sheet is saved; `None` skips saving
    #[serde(default = "default_sprite_sheet", alias = "spriteSheet")]
    pub sprite_sheet: Option<PathBuf>,
    /// What rewritten declarations reference, as seen from the CSS file
    #[serde(default = "default_sheet_reference", alias = "pathToSpriteSheetFromCSS")]
    pub path_to_sprite_sheet_from_css: String,
    /// Log missing images instead of failing
    #[serde(default = "default_true")]
    pub silent: bool,
    /// Check images on disk before packing
    #[serde(default = "default_true", alias = "shouldVerifyImagesExist")]
    pub should_verify_images_exist: bool,
    /// Treat CSS parse warnings as errors
    #[serde(default)]
    pub strict_parse: bool,
    /// Options forwarded to the packer
    #[serde(default, alias = "spritesmithOptions")]
    pub packer: PackerOptions,
    #[serde(skip)]
    pub build_callback: Option<BuildCallback>,
}

fn default_sprite_sheet() -> Option<PathBuf> {
    Some(PathBuf::from("spritesheet.png"))
}

fn default_sheet_reference() -> String {
    "spritesheet.png".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SpriterOptions {
    fn default() -> Self {
        Self {
            include_mode: IncludeMode::default(),
            sprite_sheet: default_sprite_sheet(),
            path_to_sprite_sheet_from_css: default_sheet_reference(),
            silent: true,
            should_verify_images_exist: true,
            strict_parse: false,
            packer: PackerOptions::default(),
            build_callback: None,
        }
    }
}

impl fmt::Debug for SpriterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpriterOptions")
            .field("include_mode", &self.include_mode)
            .field("sprite_sheet", &self.sprite_sheet)
            .field("path_to_sprite_sheet_from_css", &self.path_to_sprite_sheet_from_css)
            .field("silent", &self.silent)
            .field("should_verify_images_exist", &self.should_verify_images_exist)
            .field("strict_parse", &self.strict_parse)
            .field("packer", &self.packer)
            .field("build_callback", &self.build_callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl SpriterOptions {
    /// Register a callback invoked with the packed sheet.
    pub fn with_build_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PackedSheet) + Send + Sync + 'static,
    {
        self.build_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_include_mode(mut self, mode: IncludeMode) -> Self {
        self.include_mode = mode;
        self
    }

    pub fn with_sprite_sheet(mut self, path: Option<PathBuf>) -> Self {
        self.sprite_sheet = path;
        self
    }

    pub fn with_sheet_reference(mut self, reference: impl Into<String>) -> Self {
        self.path_to_sprite_sheet_from_css = reference.into();
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_verify_images(mut self, verify: bool) -> Self {
        self.should_verify_images_exist = verify;
        self
    }
}

/// Where the command line writes rewritten CSS.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("build")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { out_dir: default_out_dir() }
    }
}

/// Root of `spriter.toml`.
///
/// ```toml
/// [sprite]
/// include-mode = "explicit"
/// sprite-sheet = "dist/images/spritesheet.png"
/// path-to-sprite-sheet-from-css = "../images/spritesheet.png"
///
/// [sprite.packer]
/// algorithm = "left-right"
/// padding = 2
///
/// [output]
/// out-dir = "dist/css"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpriterConfig {
    #[serde(default)]
    pub sprite: SpriterOptions,
    #[serde(default)]
    pub output: OutputConfig,
}

/// A single validation problem.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "sprite.packer.max-size")
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spriter.toml: '{}' {}", self.field, self.message)
    }
}

impl SpriterConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.sprite.path_to_sprite_sheet_from_css.trim().is_empty() {
            errors.push(ConfigValidationError {
                field: "sprite.path-to-sprite-sheet-from-css".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        let [max_w, max_h] = self.sprite.packer.max_size;
        if max_w == 0 || max_h == 0 {
            errors.push(ConfigValidationError {
                field: "sprite.packer.max-size".to_string(),
                message: "dimensions must be positive".to_string(),
            });
        }

        errors
    }

    /// Fold values that are spelled differently in TOML into their canonical form.
    pub(crate) fn normalize(&mut self) {
        // TOML has no null, so an empty path means "don't save"
        if self.sprite.sprite_sheet.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            self.sprite.sprite_sheet = None;
        }
    }
}
