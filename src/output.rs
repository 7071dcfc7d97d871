//! Writing the sprite sheet and rewritten CSS to disk

use std::io;
use std::path::{Component, Path, PathBuf};

/// Error type for output operations
#[derive(Debug)]
pub enum OutputError {
    /// IO error while creating directories or writing the file
    Io { path: PathBuf, source: io::Error },
    /// Two inputs map to the same output file
    Collision { path: PathBuf },
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            OutputError::Collision { path } => {
                write!(f, "{}: more than one input writes to this file", path.display())
            }
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Io { source, .. } => Some(source),
            OutputError::Collision { .. } => None,
        }
    }
}

/// Write `bytes` to `path`, creating parent directories as needed.
pub fn write_file(bytes: &[u8], path: &Path) -> Result<(), OutputError> {
    let io_err = |source| OutputError::Io { path: path.to_path_buf(), source };

    // Create parent directories if they don't exist
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    std::fs::write(path, bytes).map_err(io_err)
}

/// Save encoded sprite sheet bytes.
pub fn save_sheet(image: &[u8], path: &Path) -> Result<(), OutputError> {
    write_file(image, path)
}

/// Deepest directory containing every path in `inputs`.
pub fn common_parent<'a>(inputs: impl IntoIterator<Item = &'a Path>) -> PathBuf {
    let mut root: Option<PathBuf> = None;
    for input in inputs {
        let parent = input.parent().unwrap_or(Path::new(""));
        root = Some(match root {
            None => parent.to_path_buf(),
            Some(root) => root
                .components()
                .zip(parent.components())
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a.as_os_str())
                .collect(),
        });
    }
    root.unwrap_or_default()
}

/// Where a rewritten chunk is written.
///
/// | Scenario | Output |
/// |----------|--------|
/// | No output directory | the input path itself |
/// | `-o dir` | `dir/` + the input path relative to `root` |
/// | `-o dir`, input outside `root` | `dir/{file_name}` |
pub fn generate_output_path(input: &Path, root: &Path, out_dir: Option<&Path>) -> PathBuf {
    let Some(dir) = out_dir else {
        return input.to_path_buf();
    };

    let relative = input
        .strip_prefix(root)
        .ok()
        .filter(|rel| rel.file_name().is_some())
        .filter(|rel| rel.components().all(|c| matches!(c, Component::Normal(_))))
        .map(Path::to_path_buf)
        .or_else(|| input.file_name().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("output.css"));
    dir.join(relative)
}
