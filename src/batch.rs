//! The sprite batch: collect chunks, pack once, rewrite everything
//!
//! A batch is two-phase. While collecting, each pushed chunk is parsed and its
//! qualifying background declarations and images are recorded. [`SpriteBatch::finish`]
//! is the barrier: it verifies and packs the batch-wide image set, hands the sheet to
//! the build callback, saves it, and only then rewrites every chunk. A fatal error in
//! any of those steps means no chunk is produced.

use crate::collect::{collect_images, verify_images, ImageSet, VerifyPolicy};
use crate::config::SpriterOptions;
use crate::css::parse_stylesheet;
use crate::error::{SpriterError, Warning};
use crate::locate::{background_image_declarations, ImageDeclaration};
use crate::output::save_sheet;
use crate::pack::{AtlasPacker, PackedSheet, SheetPacker};
use crate::rewrite::Rewriter;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Contents of a chunk as it enters the batch.
pub enum ChunkContents {
    /// The whole file in memory
    Buffer(Vec<u8>),
    /// A streaming body; not supported
    Stream(Box<dyn Read + Send>),
    /// No contents; passed through unchanged
    Null,
}

impl fmt::Debug for ChunkContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkContents::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
            ChunkContents::Stream(_) => f.write_str("Stream"),
            ChunkContents::Null => f.write_str("Null"),
        }
    }
}

/// One stylesheet file flowing through the batch.
#[derive(Debug)]
pub struct Chunk {
    pub path: PathBuf,
    pub contents: ChunkContents,
}

impl Chunk {
    pub fn from_buffer(path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { path: path.into(), contents: ChunkContents::Buffer(bytes.into()) }
    }

    pub fn null(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), contents: ChunkContents::Null }
    }

    /// Read a file from disk into a buffer chunk.
    pub fn from_file(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let bytes = std::fs::read(&path)?;
        Ok(Self::from_buffer(path, bytes))
    }

    /// Directory that relative image URLs in this chunk resolve against.
    pub fn base_dir(&self) -> &Path {
        chunk_dir(&self.path)
    }
}

fn chunk_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

/// What the batch remembers about a collected chunk.
#[derive(Debug, Clone)]
pub struct ChunkData {
    pub path: PathBuf,
    /// Decoded text, `None` for a null chunk
    pub source: Option<String>,
    /// Qualifying declarations in source order
    pub declarations: Vec<ImageDeclaration>,
}

/// A rewritten chunk.
#[derive(Debug, Clone)]
pub struct SpritedChunk {
    pub path: PathBuf,
    /// Rewritten bytes, `None` for a chunk that came in without contents
    pub contents: Option<Vec<u8>>,
    /// Encoded sheet shared by every chunk of the batch
    pub spritesheet: Arc<Vec<u8>>,
}

impl SpritedChunk {
    /// The rewritten CSS as text.
    pub fn text(&self) -> Option<&str> {
        self.contents.as_deref().and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

/// Result of a finished batch, chunks in the order they were pushed.
#[derive(Debug, Clone)]
pub struct SpritedBatch {
    pub chunks: Vec<SpritedChunk>,
    pub sheet: Arc<PackedSheet>,
    pub warnings: Vec<Warning>,
}

/// A batch in its collecting phase.
#[derive(Debug)]
pub struct SpriteBatch {
    options: SpriterOptions,
    chunks: Vec<ChunkData>,
    images: ImageSet,
    warnings: Vec<Warning>,
}

impl SpriteBatch {
    pub fn new(options: SpriterOptions) -> Self {
        Self { options, chunks: Vec::new(), images: ImageSet::new(), warnings: Vec::new() }
    }

    pub fn options(&self) -> &SpriterOptions {
        &self.options
    }

    /// Images collected so far, in first-reference order.
    pub fn images(&self) -> &ImageSet {
        &self.images
    }

    pub fn chunks(&self) -> &[ChunkData] {
        &self.chunks
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Parse a chunk and record its declarations and images.
    pub fn push(&mut self, chunk: Chunk) -> Result<(), SpriterError> {
        let Chunk { path, contents } = chunk;

        let bytes = match contents {
            ChunkContents::Buffer(bytes) => bytes,
            ChunkContents::Stream(_) => return Err(SpriterError::UnsupportedChunkKind { path }),
            ChunkContents::Null => {
                log::debug!("passing through empty chunk {}", path.display());
                self.chunks.push(ChunkData { path, source: None, declarations: Vec::new() });
                return Ok(());
            }
        };

        let source = String::from_utf8_lossy(&bytes).into_owned();
        let parsed = parse_stylesheet(&source);

        if self.options.strict_parse {
            if let Some(warning) = parsed.warnings.into_iter().next() {
                return Err(SpriterError::Parse { path, warning });
            }
        } else {
            for warning in &parsed.warnings {
                log::warn!("{}: {}", path.display(), warning);
                self.warnings.push(Warning::new(format!("{}: {}", path.display(), warning)));
            }
        }

        let declarations = background_image_declarations(&parsed.stylesheet, self.options.include_mode);
        let before = self.images.len();
        collect_images(&declarations, chunk_dir(&path), &mut self.images);
        log::debug!(
            "{}: {} background declarations, {} new images",
            path.display(),
            declarations.len(),
            self.images.len() - before
        );

        self.chunks.push(ChunkData { path, source: Some(source), declarations });
        Ok(())
    }

    /// Verify, pack, save and rewrite.
    pub fn finish(self, packer: &dyn SheetPacker) -> Result<SpritedBatch, SpriterError> {
        let SpriteBatch { options, chunks, images, mut warnings } = self;

        let policy = VerifyPolicy { verify: options.should_verify_images_exist, silent: options.silent };
        let verified = verify_images(&images, policy)?;
        for missing in &verified.missing {
            warnings.push(Warning::new(format!("Image could not be found: {}", missing.display())));
        }

        let sheet = packer.pack(&verified.images, &options.packer)?;
        log::info!(
            "packed {} images into a {}x{} sheet",
            sheet.coordinates.len(),
            sheet.properties.width,
            sheet.properties.height
        );

        if let Some(callback) = &options.build_callback {
            callback(&sheet);
        }

        if let Some(sheet_path) = &options.sprite_sheet {
            save_sheet(&sheet.image, sheet_path).map_err(SpriterError::Persist)?;
            log::info!("saved sprite sheet to {}", sheet_path.display());
        }

        let spritesheet = Arc::new(sheet.image.clone());
        let rewriter = Rewriter::new(&sheet.coordinates, &options.path_to_sprite_sheet_from_css);

        let chunks = chunks
            .into_iter()
            .map(|data| {
                let contents = data.source.as_deref().map(|source| {
                    rewriter.rewrite_chunk(source, chunk_dir(&data.path), &data.declarations).into_bytes()
                });
                SpritedChunk { path: data.path, contents, spritesheet: Arc::clone(&spritesheet) }
            })
            .collect();

        Ok(SpritedBatch { chunks, sheet: Arc::new(sheet), warnings })
    }
}

/// One-shot driver: push every chunk, then finish.
#[derive(Debug, Clone, Default)]
pub struct Spriter {
    options: SpriterOptions,
}

impl Spriter {
    pub fn new(options: SpriterOptions) -> Self {
        Self { options }
    }

    /// Run a batch with the bundled [`AtlasPacker`].
    pub fn run<I>(&self, chunks: I) -> Result<SpritedBatch, SpriterError>
    where
        I: IntoIterator<Item = Chunk>,
    {
        self.run_with(chunks, &AtlasPacker)
    }

    pub fn run_with<I>(&self, chunks: I, packer: &dyn SheetPacker) -> Result<SpritedBatch, SpriterError>
    where
        I: IntoIterator<Item = Chunk>,
    {
        let mut batch = SpriteBatch::new(self.options.clone());
        for chunk in chunks {
            batch.push(chunk)?;
        }
        batch.finish(packer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{PackError, PackerOptions, SheetProperties, SpriteRect};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Stacks images 10px apart without reading them.
    struct StackPacker;

    impl SheetPacker for StackPacker {
        fn pack(&self, images: &[PathBuf], _options: &PackerOptions) -> Result<PackedSheet, PackError> {
            let coordinates = images
                .iter()
                .enumerate()
                .map(|(i, path)| (path.clone(), SpriteRect { x: 0, y: i as u32 * 10, width: 10, height: 10 }))
                .collect();
            Ok(PackedSheet {
                image: vec![0x89, b'P', b'N', b'G'],
                coordinates,
                properties: SheetProperties { width: 10, height: (images.len() as u32 * 10).max(1) },
            })
        }
    }

    fn options() -> SpriterOptions {
        SpriterOptions::default().with_sprite_sheet(None).with_verify_images(false)
    }

    #[test]
    fn test_chunks_come_out_in_push_order() {
        let mut batch = SpriteBatch::new(options());
        batch.push(Chunk::from_buffer("css/b.css", ".b { background: url(b.png); }")).unwrap();
        batch.push(Chunk::null("css/empty.css")).unwrap();
        batch.push(Chunk::from_buffer("css/a.css", ".a { color: red; }")).unwrap();

        let result = batch.finish(&StackPacker).unwrap();
        let paths: Vec<_> = result.chunks.iter().map(|c| c.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("css/b.css"), PathBuf::from("css/empty.css"), PathBuf::from("css/a.css")]
        );
        assert_eq!(
            result.chunks[0].text(),
            Some(".b { background: url(spritesheet.png); background-position: -0px -0px; }")
        );
        assert_eq!(result.chunks[1].contents, None);
        assert_eq!(result.chunks[2].text(), Some(".a { color: red; }"));
        assert_eq!(*result.chunks[0].spritesheet, result.sheet.image);
    }

    #[test]
    fn test_stream_chunks_rejected() {
        let mut batch = SpriteBatch::new(options());
        let stream = Chunk {
            path: PathBuf::from("live.css"),
            contents: ChunkContents::Stream(Box::new(std::io::empty())),
        };
        let err = batch.push(stream).unwrap_err();
        assert!(matches!(err, SpriterError::UnsupportedChunkKind { .. }));
    }

    #[test]
    fn test_images_deduplicated_across_chunks() {
        let mut batch = SpriteBatch::new(options());
        batch.push(Chunk::from_buffer("site/css/a.css", ".a { background: url(../img/x.png); }")).unwrap();
        batch.push(Chunk::from_buffer("site/b.css", ".b { background: url(img/x.png); }")).unwrap();
        batch.push(Chunk::from_buffer("site/b2.css", ".c { background: url(./img/y.png); }")).unwrap();

        assert_eq!(
            batch.images().as_slice(),
            &[PathBuf::from("site/img/x.png"), PathBuf::from("site/img/y.png")]
        );

        let result = batch.finish(&StackPacker).unwrap();
        assert_eq!(result.sheet.coordinates.len(), 2);
        assert!(result.chunks[1].text().unwrap().contains("-0px -0px"));
        assert!(result.chunks[2].text().unwrap().contains("-0px -10px"));
    }

    #[test]
    fn test_lenient_parse_collects_warnings() {
        let mut batch = SpriteBatch::new(options());
        batch.push(Chunk::from_buffer("broken.css", ".a { background: url(a.png); ")).unwrap();
        assert!(!batch.warnings().is_empty());
        assert!(batch.warnings()[0].message.starts_with("broken.css:"));

        let result = batch.finish(&StackPacker).unwrap();
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn test_strict_parse_fails_on_warning() {
        let mut opts = options();
        opts.strict_parse = true;
        let mut batch = SpriteBatch::new(opts);

        let err = batch.push(Chunk::from_buffer("broken.css", ".a { color: red; ")).unwrap_err();
        match err {
            SpriterError::Parse { path, .. } => assert_eq!(path, PathBuf::from("broken.css")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_image_silent_leaves_url() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("a.png");
        fs::write(&present, b"png").unwrap();
        let css_path = temp.path().join("style.css");

        let mut batch = SpriteBatch::new(options().with_verify_images(true));
        batch
            .push(Chunk::from_buffer(&css_path, ".a { background: url(a.png); }\n.b { background: url(gone.png); }"))
            .unwrap();
        let result = batch.finish(&StackPacker).unwrap();

        let text = result.chunks[0].text().unwrap();
        assert_eq!(
            text,
            ".a { background: url(spritesheet.png); background-position: -0px -0px; }\n.b { background: url(gone.png); }"
        );
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].message.contains("gone.png"));
    }

    #[test]
    fn test_missing_image_not_silent_aborts() {
        let temp = TempDir::new().unwrap();
        let called = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&called);

        let opts = options()
            .with_verify_images(true)
            .with_silent(false)
            .with_build_callback(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        let mut batch = SpriteBatch::new(opts);
        batch
            .push(Chunk::from_buffer(temp.path().join("s.css"), ".a { background: url(gone.png); }"))
            .unwrap();

        let err = batch.finish(&StackPacker).unwrap_err();
        assert!(matches!(err, SpriterError::MissingImage { .. }));
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_build_callback_sees_sheet() {
        let dims = Arc::new(std::sync::Mutex::new(None));
        let sink = Arc::clone(&dims);
        let opts = options().with_build_callback(move |sheet| {
            *sink.lock().unwrap() = Some(sheet.properties);
        });

        let result = Spriter::new(opts)
            .run_with(
                vec![Chunk::from_buffer("s.css", ".a { background: url(a.png); } .b { background: url(b.png); }")],
                &StackPacker,
            )
            .unwrap();

        assert_eq!(*dims.lock().unwrap(), Some(SheetProperties { width: 10, height: 20 }));
        assert_eq!(result.sheet.properties.height, 20);
    }

    #[test]
    fn test_sheet_saved_before_chunks_returned() {
        let temp = TempDir::new().unwrap();
        let sheet_path = temp.path().join("dist/images/spritesheet.png");

        let result = Spriter::new(options().with_sprite_sheet(Some(sheet_path.clone())))
            .run_with(vec![Chunk::from_buffer("s.css", ".a { background: url(a.png); }")], &StackPacker)
            .unwrap();

        assert_eq!(fs::read(&sheet_path).unwrap(), result.sheet.image);
    }

    #[test]
    fn test_persist_failure_aborts() {
        let temp = TempDir::new().unwrap();
        // The temp dir itself can't be written as a file
        let opts = options().with_sprite_sheet(Some(temp.path().to_path_buf()));

        let err = Spriter::new(opts)
            .run_with(vec![Chunk::from_buffer("s.css", ".a { background: url(a.png); }")], &StackPacker)
            .unwrap_err();
        assert!(matches!(err, SpriterError::Persist(_)));
    }

    #[test]
    fn test_chunk_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("main.css");
        fs::write(&path, ".a { color: red; }").unwrap();

        let chunk = Chunk::from_file(&path).unwrap();
        assert_eq!(chunk.base_dir(), temp.path());
        assert!(matches!(chunk.contents, ChunkContents::Buffer(ref b) if b.len() == 18));
        assert!(Chunk::from_file(temp.path().join("nope.css")).is_err());
    }
}
