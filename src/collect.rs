//! Collecting the image files referenced by background declarations
//!
//! Paths are resolved against the directory of the chunk that references them and
//! deduplicated across the whole batch. Existence checks run concurrently.

use crate::error::SpriterError;
use crate::locate::ImageDeclaration;
use crate::url::find_urls;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Lexically normalise a path: drop `.` segments and fold `..` into the parent
/// where one exists. The filesystem is not consulted.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }

    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// Resolve a `url(...)` argument against the directory of its chunk.
///
/// A leading `/` does not make the URL absolute; it is joined under `chunk_dir`
/// like any other path.
///
/// # Example
///
/// ```
/// use css_spriter::collect::resolve_image_path;
/// use std::path::{Path, PathBuf};
///
/// let resolved = resolve_image_path(Path::new("site/css"), "../images/a.png");
/// assert_eq!(resolved, PathBuf::from("site/images/a.png"));
/// ```
pub fn resolve_image_path(chunk_dir: &Path, url: &str) -> PathBuf {
    normalize_path(&chunk_dir.join(url.trim_start_matches('/')))
}

/// Resolved paths of every `url(...)` in a declaration value, in source order.
pub fn extract_image_paths(value: &str, chunk_dir: &Path) -> Vec<PathBuf> {
    find_urls(value).iter().map(|found| resolve_image_path(chunk_dir, found.path)).collect()
}

/// Insertion-ordered, deduplicated set of image paths for a batch.
#[derive(Debug, Clone, Default)]
pub struct ImageSet {
    order: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

impl ImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path; returns `false` if it was already present.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        if self.seen.contains(&path) {
            return false;
        }
        self.seen.insert(path.clone());
        self.order.push(path);
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.seen.contains(path)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.order.iter()
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.order
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

/// Add every image referenced by `declarations` to `images`.
pub fn collect_images(declarations: &[ImageDeclaration], chunk_dir: &Path, images: &mut ImageSet) {
    for decl in declarations {
        for path in extract_image_paths(&decl.declaration.value, chunk_dir) {
            images.insert(path);
        }
    }
}

/// How missing images are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPolicy {
    /// Check each image on disk before packing
    pub verify: bool,
    /// Log missing images instead of failing
    pub silent: bool,
}

/// Outcome of the existence check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifiedImages {
    /// Images that go on to packing, in collection order
    pub images: Vec<PathBuf>,
    /// Images that were not found (only populated when verifying)
    pub missing: Vec<PathBuf>,
}

/// Check that every collected image exists.
///
/// Checks run in parallel and are independent of each other; the result keeps
/// collection order. Each missing image is logged. When `policy.silent` is off,
/// any missing image fails the whole batch.
pub fn verify_images(images: &ImageSet, policy: VerifyPolicy) -> Result<VerifiedImages, SpriterError> {
    if !policy.verify {
        return Ok(VerifiedImages { images: images.as_slice().to_vec(), missing: Vec::new() });
    }

    let checks: Vec<(&PathBuf, bool)> = images
        .as_slice()
        .par_iter()
        .map(|path| (path, std::fs::metadata(path).is_ok()))
        .collect();

    let mut verified = VerifiedImages::default();
    for (path, exists) in checks {
        if exists {
            verified.images.push(path.clone());
        } else {
            log::warn!("Image could not be found: {}", path.display());
            verified.missing.push(path.clone());
        }
    }

    if !policy.silent && !verified.missing.is_empty() {
        return Err(SpriterError::MissingImage { paths: verified.missing });
    }

    Ok(verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::parse_stylesheet;
    use crate::filter::IncludeMode;
    use crate::locate::background_image_declarations;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("a/./b/../c.png")), PathBuf::from("a/c.png"));
        assert_eq!(normalize_path(Path::new("../a.png")), PathBuf::from("../a.png"));
        assert_eq!(normalize_path(Path::new("a/../../b.png")), PathBuf::from("../b.png"));
        assert_eq!(normalize_path(Path::new("/x/../../y.png")), PathBuf::from("/y.png"));
        assert_eq!(normalize_path(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_resolve_against_chunk_dir() {
        assert_eq!(
            resolve_image_path(Path::new("/site/css"), "../img/a.png"),
            PathBuf::from("/site/img/a.png")
        );
        assert_eq!(resolve_image_path(Path::new(""), "a.png"), PathBuf::from("a.png"));
        assert_eq!(resolve_image_path(Path::new("css"), "/img/a.png"), PathBuf::from("css/img/a.png"));
    }

    #[test]
    fn test_different_spellings_resolve_equal() {
        let dir = Path::new("site/css");
        assert_eq!(
            resolve_image_path(dir, "../img/a.png"),
            resolve_image_path(dir, "./../css/../img/a.png")
        );
    }

    #[test]
    fn test_extract_multiple_images() {
        let paths = extract_image_paths("url(a.png), url(\"sub/b.png\") no-repeat", Path::new("css"));
        assert_eq!(paths, vec![PathBuf::from("css/a.png"), PathBuf::from("css/sub/b.png")]);
    }

    #[test]
    fn test_image_set_dedups_in_order() {
        let mut set = ImageSet::new();
        assert!(set.insert(PathBuf::from("b.png")));
        assert!(set.insert(PathBuf::from("a.png")));
        assert!(!set.insert(PathBuf::from("b.png")));

        assert_eq!(set.len(), 2);
        assert_eq!(set.as_slice(), &[PathBuf::from("b.png"), PathBuf::from("a.png")]);
        assert!(set.contains(Path::new("a.png")));

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_collect_images_across_declarations() {
        let css = ".a { background: url(../img/a.png); }\n.b { background-image: url('../img/a.png'), url(../img/b.png); }";
        let sheet = parse_stylesheet(css).stylesheet;
        let decls = background_image_declarations(&sheet, IncludeMode::Implicit);

        let mut set = ImageSet::new();
        collect_images(&decls, Path::new("site/css"), &mut set);
        assert_eq!(
            set.as_slice(),
            &[PathBuf::from("site/img/a.png"), PathBuf::from("site/img/b.png")]
        );
    }

    #[test]
    fn test_commented_out_url_is_not_collected() {
        let css = ".a { background: url(a.png) /* was url(old.png) */ no-repeat; }";
        let sheet = parse_stylesheet(css).stylesheet;
        let decls = background_image_declarations(&sheet, IncludeMode::Implicit);

        let mut set = ImageSet::new();
        collect_images(&decls, Path::new(""), &mut set);
        assert_eq!(set.as_slice(), &[PathBuf::from("a.png")]);
    }

    fn set_of(paths: &[PathBuf]) -> ImageSet {
        let mut set = ImageSet::new();
        for path in paths {
            set.insert(path.clone());
        }
        set
    }

    #[test]
    fn test_verify_disabled_passes_everything() {
        let set = set_of(&[PathBuf::from("/definitely/not/here.png")]);
        let verified = verify_images(&set, VerifyPolicy { verify: false, silent: false }).unwrap();
        assert_eq!(verified.images.len(), 1);
        assert!(verified.missing.is_empty());
    }

    #[test]
    fn test_verify_silent_drops_missing() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("present.png");
        fs::write(&present, b"not really a png").unwrap();
        let missing = temp.path().join("missing.png");

        let set = set_of(&[missing.clone(), present.clone()]);
        let verified = verify_images(&set, VerifyPolicy { verify: true, silent: true }).unwrap();

        assert_eq!(verified.images, vec![present]);
        assert_eq!(verified.missing, vec![missing]);
    }

    #[test]
    fn test_verify_not_silent_fails() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.png");

        let set = set_of(&[missing.clone()]);
        let err = verify_images(&set, VerifyPolicy { verify: true, silent: false }).unwrap_err();
        match err {
            SpriterError::MissingImage { paths } => assert_eq!(paths, vec![missing]),
            other => panic!("unexpected error: {other}"),
        }
    }
}
