//! Error and warning types for a sprite batch

use crate::config::ConfigError;
use crate::css::ParseWarning;
use crate::output::OutputError;
use crate::pack::PackError;
use std::path::PathBuf;
use thiserror::Error;

/// A non-fatal problem noticed while processing a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub message: String,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Any error that aborts a sprite batch. No chunk is emitted once one occurs.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SpriterError {
    /// CSS could not be parsed cleanly and strict parsing was requested
    #[error("failed to parse '{}': {warning}", path.display())]
    Parse { path: PathBuf, warning: ParseWarning },
    /// Referenced images are missing and `silent` is off
    #[error("Image could not be found: {}", paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    MissingImage { paths: Vec<PathBuf> },
    /// The packer failed to build the sheet
    #[error("Error creating sprite sheet image: {0}")]
    Packing(#[from] PackError),
    /// The packed sheet could not be written
    #[error("Spritesheet failed to save: {0}")]
    Persist(#[source] OutputError),
    /// A chunk that is neither a buffer nor empty
    #[error("cannot operate on stream: '{}'", path.display())]
    UnsupportedChunkKind { path: PathBuf },
    /// Reading or writing a chunk failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}
