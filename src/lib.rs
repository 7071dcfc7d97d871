//! css-spriter - combine CSS background images into one sprite sheet
//!
//! This library provides functionality to:
//! - Parse stylesheets into a positional tree and find `background`/`background-image`
//!   declarations that reference images
//! - Honour per-declaration `/* @meta {"spritesheet": {"include": false}} */` comments
//! - Pack every referenced image into a single PNG sheet
//! - Rewrite each declaration to point at the sheet with a matching `background-position`
//!
//! The usual entry point is [`Spriter`], or [`SpriteBatch`] for incremental use.

pub mod batch;
pub mod cli;
pub mod collect;
pub mod config;
pub mod css;
pub mod error;
pub mod filter;
pub mod locate;
pub mod meta;
pub mod output;
pub mod pack;
pub mod rewrite;
pub mod url;

pub use batch::{Chunk, ChunkContents, SpriteBatch, SpritedBatch, SpritedChunk, Spriter};
pub use config::SpriterOptions;
pub use error::{SpriterError, Warning};
pub use filter::IncludeMode;
pub use pack::{AtlasPacker, PackedSheet, SheetPacker};
