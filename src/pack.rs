//! Sprite sheet packing - combines referenced images into one sheet with a coordinate map
//!
//! The batch only talks to [`SheetPacker`]; [`AtlasPacker`] is the bundled
//! implementation and supports simple stacking layouts plus shelf bin packing.

use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Position and size of one image within the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Image path → placement in the sheet. Keys are exactly the paths given to the packer.
pub type CoordinateMap = HashMap<PathBuf, SpriteRect>;

/// Overall sheet dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetProperties {
    pub width: u32,
    pub height: u32,
}

/// Result of packing: the encoded PNG plus where each image landed.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedSheet {
    pub image: Vec<u8>,
    pub coordinates: CoordinateMap,
    pub properties: SheetProperties,
}

/// Layout algorithm for the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PackAlgorithm {
    /// Images stacked vertically
    #[default]
    TopDown,
    /// Images side by side
    LeftRight,
    /// Each image below and right of the previous
    Diagonal,
    /// Each image below and left of the previous
    AltDiagonal,
    /// Shelf bin packing, tallest first
    #[serde(alias = "binary-tree")]
    Shelf,
}

impl PackAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackAlgorithm::TopDown => "top-down",
            PackAlgorithm::LeftRight => "left-right",
            PackAlgorithm::Diagonal => "diagonal",
            PackAlgorithm::AltDiagonal => "alt-diagonal",
            PackAlgorithm::Shelf => "shelf",
        }
    }
}

impl fmt::Display for PackAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top-down" => Ok(PackAlgorithm::TopDown),
            "left-right" => Ok(PackAlgorithm::LeftRight),
            "diagonal" => Ok(PackAlgorithm::Diagonal),
            "alt-diagonal" => Ok(PackAlgorithm::AltDiagonal),
            "shelf" | "binary-tree" => Ok(PackAlgorithm::Shelf),
            other => Err(format!(
                "unknown packing algorithm '{other}' (expected top-down, left-right, diagonal, alt-diagonal or shelf)"
            )),
        }
    }
}

/// Options handed to the packer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackerOptions {
    #[serde(default)]
    pub algorithm: PackAlgorithm,
    /// Pixels between images (not on the sheet edges)
    #[serde(default)]
    pub padding: u32,
    /// Maximum sheet dimensions [width, height]
    #[serde(default = "default_max_size")]
    pub max_size: [u32; 2],
    /// Anything else, forwarded untouched to the packer
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_max_size() -> [u32; 2] {
    [4096, 4096]
}

impl Default for PackerOptions {
    fn default() -> Self {
        Self {
            algorithm: PackAlgorithm::default(),
            padding: 0,
            max_size: default_max_size(),
            extra: Map::new(),
        }
    }
}

/// Error type for packing failures
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PackError {
    /// An image could not be opened or decoded
    #[error("failed to load '{}': {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    /// The composed sheet could not be encoded
    #[error("failed to encode sheet: {0}")]
    Encode(#[source] image::ImageError),
    /// The images don't fit within the configured maximum size
    #[error("image '{}' ({width}x{height}) does not fit in a {max_w}x{max_h} sheet", path.display())]
    Layout { path: PathBuf, width: u32, height: u32, max_w: u32, max_h: u32 },
}

/// Packs a list of image files into a single sheet.
pub trait SheetPacker {
    fn pack(&self, images: &[PathBuf], options: &PackerOptions) -> Result<PackedSheet, PackError>;
}

/// Transparent color for the sheet background
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Default packer: decodes images with the `image` crate and composites a PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtlasPacker;

impl SheetPacker for AtlasPacker {
    fn pack(&self, images: &[PathBuf], options: &PackerOptions) -> Result<PackedSheet, PackError> {
        let sprites = images
            .par_iter()
            .map(|path| load_image(path))
            .collect::<Result<Vec<_>, _>>()?;

        let sizes: Vec<(u32, u32)> = sprites.iter().map(|s| s.dimensions()).collect();
        let layout = layout_sprites(&sizes, options).map_err(|index| PackError::Layout {
            path: images[index].clone(),
            width: sizes[index].0,
            height: sizes[index].1,
            max_w: options.max_size[0],
            max_h: options.max_size[1],
        })?;

        let mut sheet = RgbaImage::from_pixel(layout.width, layout.height, TRANSPARENT);
        let mut coordinates = CoordinateMap::with_capacity(images.len());

        for ((path, sprite), &(x, y)) in images.iter().zip(&sprites).zip(&layout.positions) {
            copy_sprite_to_sheet(&mut sheet, sprite, x, y);
            coordinates.insert(
                path.clone(),
                SpriteRect { x, y, width: sprite.width(), height: sprite.height() },
            );
        }

        let properties = SheetProperties { width: sheet.width(), height: sheet.height() };
        let image = encode_png(sheet)?;

        log::debug!(
            "packed {} images into {}x{} sheet ({})",
            images.len(),
            properties.width,
            properties.height,
            options.algorithm
        );

        Ok(PackedSheet { image, coordinates, properties })
    }
}

fn load_image(path: &Path) -> Result<RgbaImage, PackError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| PackError::Load { path: path.to_path_buf(), source })
}

fn encode_png(sheet: RgbaImage) -> Result<Vec<u8>, PackError> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(sheet)
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .map_err(PackError::Encode)?;
    Ok(bytes)
}

/// Placement of every sprite plus the resulting sheet size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Top-left corner of each sprite, in input order
    pub positions: Vec<(u32, u32)>,
    pub width: u32,
    pub height: u32,
}

/// Lay out sprites of the given sizes.
///
/// An empty input yields a 1x1 sheet. Returns the index of the first sprite that
/// cannot be placed when shelf packing runs out of room.
pub fn layout_sprites(sizes: &[(u32, u32)], options: &PackerOptions) -> Result<Layout, usize> {
    if sizes.is_empty() {
        return Ok(Layout { positions: vec![], width: 1, height: 1 });
    }

    let padding = options.padding;
    let gaps = (sizes.len() as u32 - 1) * padding;
    let sum_w: u32 = sizes.iter().map(|s| s.0).sum::<u32>() + gaps;
    let sum_h: u32 = sizes.iter().map(|s| s.1).sum::<u32>() + gaps;
    let max_w = sizes.iter().map(|s| s.0).max().unwrap_or(1);
    let max_h = sizes.iter().map(|s| s.1).max().unwrap_or(1);

    let layout = match options.algorithm {
        PackAlgorithm::TopDown => {
            let mut y = 0;
            let positions = sizes
                .iter()
                .map(|&(_, h)| {
                    let pos = (0, y);
                    y += h + padding;
                    pos
                })
                .collect();
            Layout { positions, width: max_w, height: sum_h }
        }
        PackAlgorithm::LeftRight => {
            let mut x = 0;
            let positions = sizes
                .iter()
                .map(|&(w, _)| {
                    let pos = (x, 0);
                    x += w + padding;
                    pos
                })
                .collect();
            Layout { positions, width: sum_w, height: max_h }
        }
        PackAlgorithm::Diagonal => {
            let (mut x, mut y) = (0, 0);
            let positions = sizes
                .iter()
                .map(|&(w, h)| {
                    let pos = (x, y);
                    x += w + padding;
                    y += h + padding;
                    pos
                })
                .collect();
            Layout { positions, width: sum_w, height: sum_h }
        }
        PackAlgorithm::AltDiagonal => {
            let (mut x, mut y) = (0, 0);
            let positions = sizes
                .iter()
                .map(|&(w, h)| {
                    let pos = (sum_w - x - w, y);
                    x += w + padding;
                    y += h + padding;
                    pos
                })
                .collect();
            Layout { positions, width: sum_w, height: sum_h }
        }
        PackAlgorithm::Shelf => return shelf_layout(sizes, padding, options.max_size),
    };

    Ok(layout)
}

/// A shelf in the shelf packing algorithm
#[derive(Debug)]
struct Shelf {
    y: u32,
    height: u32,
    width_used: u32,
}

fn shelf_layout(sizes: &[(u32, u32)], padding: u32, max_size: [u32; 2]) -> Result<Layout, usize> {
    // Sort by height descending (better packing)
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| sizes[b].1.cmp(&sizes[a].1));

    let mut shelves: Vec<Shelf> = Vec::new();
    let mut positions = vec![(0, 0); sizes.len()];

    for index in order {
        let (w, h) = sizes[index];
        let pos = try_place_in_shelves(&mut shelves, w + padding, h + padding, h, max_size).ok_or(index)?;
        positions[index] = pos;
    }

    let (width, height) = calculate_sheet_size(&shelves, padding);
    Ok(Layout { positions, width, height })
}

/// Try to place a sprite in the given shelves
fn try_place_in_shelves(
    shelves: &mut Vec<Shelf>,
    padded_w: u32,
    padded_h: u32,
    sprite_h: u32,
    max_size: [u32; 2],
) -> Option<(u32, u32)> {
    // Try to fit in existing shelf
    for shelf in shelves.iter_mut() {
        if sprite_h <= shelf.height && shelf.width_used + padded_w <= max_size[0] {
            let x = shelf.width_used;
            shelf.width_used += padded_w;
            return Some((x, shelf.y));
        }
    }

    // Try to create new shelf
    let new_shelf_y = shelves.last().map(|s| s.y + s.height).unwrap_or(0);
    if new_shelf_y + padded_h <= max_size[1] && padded_w <= max_size[0] {
        shelves.push(Shelf { y: new_shelf_y, height: padded_h, width_used: padded_w });
        return Some((0, new_shelf_y));
    }

    None
}

/// Sheet dimensions from the used shelves; padding is between sprites, not on edges.
fn calculate_sheet_size(shelves: &[Shelf], padding: u32) -> (u32, u32) {
    let max_width = shelves.iter().map(|s| s.width_used).max().unwrap_or(1);
    let total_height = shelves.last().map(|s| s.y + s.height).unwrap_or(1);

    let trim = |n: u32| if padding > 0 && n > padding { n - padding } else { n.max(1) };
    (trim(max_width), trim(total_height))
}

/// Copy a sprite image to the sheet at the given position
fn copy_sprite_to_sheet(sheet: &mut RgbaImage, sprite: &RgbaImage, x: u32, y: u32) {
    for sy in 0..sprite.height() {
        for sx in 0..sprite.width() {
            let pixel = *sprite.get_pixel(sx, sy);
            if x + sx < sheet.width() && y + sy < sheet.height() {
                sheet.put_pixel(x + sx, y + sy, pixel);
            }
        }
    }
}
