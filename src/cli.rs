//! Command-line interface implementation

use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::batch::{Chunk, SpritedBatch, Spriter};
use crate::config::{load_config, merge_cli_overrides, CliOverrides};
use crate::filter::IncludeMode;
use crate::output::{common_parent, generate_output_path, write_file, OutputError};
use crate::pack::PackAlgorithm;

const EXIT_SUCCESS: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_INVALID_ARGS: u8 = 2;

/// Combine the background images referenced by stylesheets into one sprite sheet
/// and rewrite the stylesheets to use it
#[derive(Parser, Debug)]
#[command(name = "spriter")]
#[command(version)]
pub struct Cli {
    /// Stylesheets to process (files or glob patterns)
    #[arg(required = true)]
    pub inputs: Vec<String>,

    /// Path to spriter.toml (default: search upward from the working directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the rewritten stylesheets [default: build]
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Where to save the sprite sheet
    #[arg(long, conflicts_with = "no_sheet")]
    pub sheet: Option<PathBuf>,

    /// Don't save the sprite sheet
    #[arg(long)]
    pub no_sheet: bool,

    /// Sheet path written into the stylesheets, relative to them
    #[arg(long)]
    pub sheet_ref: Option<String>,

    /// Which declarations are sprited: implicit or explicit
    #[arg(long)]
    pub include_mode: Option<IncludeMode>,

    /// Fail when a referenced image is missing
    #[arg(long)]
    pub strict_images: bool,

    /// Skip checking that images exist before packing
    #[arg(long)]
    pub no_verify: bool,

    /// Strict mode: treat CSS parse warnings as errors
    #[arg(long)]
    pub strict: bool,

    /// Packing algorithm: top-down, left-right, diagonal, alt-diagonal or binary-tree
    #[arg(long)]
    pub algorithm: Option<PackAlgorithm>,

    /// Pixels between packed images
    #[arg(long)]
    pub padding: Option<u32>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// The flags that override `spriter.toml`.
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            out_dir: self.out_dir.clone(),
            sprite_sheet: self.sheet.clone(),
            no_sheet: self.no_sheet,
            sheet_reference: self.sheet_ref.clone(),
            include_mode: self.include_mode,
            silent: self.strict_images.then_some(false),
            verify_images: self.no_verify.then_some(false),
            strict_parse: self.strict.then_some(true),
            algorithm: self.algorithm,
            padding: self.padding,
        }
    }
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run_sprite(&cli)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG takes precedence over -v
    if let Err(e) = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init()
    {
        eprintln!("Warning: logging unavailable: {}", e);
    }
}

fn run_sprite(cli: &Cli) -> ExitCode {
    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if let Err(e) = merge_cli_overrides(&mut config, &cli.overrides()) {
        eprintln!("Error: {}", e);
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    let inputs = match expand_inputs(&cli.inputs) {
        Ok(inputs) => inputs,
        Err(message) => {
            eprintln!("Error: {}", message);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    let mut chunks = Vec::with_capacity(inputs.len());
    for input in inputs {
        match Chunk::from_file(&input) {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => {
                eprintln!("Error: Cannot read '{}': {}", input.display(), e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
    }

    let sheet_path = config.sprite.sprite_sheet.clone();
    let result = match Spriter::new(config.sprite).run(chunks) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let written = match write_chunks(&result, &config.output.out_dir) {
        Ok(written) => written,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let props = result.sheet.properties;
    println!(
        "Packed {} images into a {}x{} sheet{}",
        result.sheet.coordinates.len(),
        props.width,
        props.height,
        sheet_path.map(|p| format!(" ({})", p.display())).unwrap_or_default()
    );
    println!("Wrote {} stylesheets to {}", written.len(), config.output.out_dir.display());

    ExitCode::from(EXIT_SUCCESS)
}

/// Expand file arguments and glob patterns into a deduplicated list of paths,
/// keeping argument order.
pub fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>, String> {
    let mut paths: Vec<PathBuf> = Vec::new();

    for input in inputs {
        if !is_glob_pattern(input) {
            push_unique(&mut paths, PathBuf::from(input));
            continue;
        }

        let entries = glob::glob(input).map_err(|e| format!("Invalid pattern '{}': {}", input, e))?;
        let mut matched = false;
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => {
                    matched = true;
                    push_unique(&mut paths, path);
                }
                Ok(_) => {}
                Err(e) => log::warn!("skipping unreadable path: {}", e),
            }
        }
        if !matched {
            return Err(format!("No files match '{}'", input));
        }
    }

    Ok(paths)
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

fn push_unique(paths: &mut Vec<PathBuf>, path: PathBuf) {
    if !paths.contains(&path) {
        paths.push(path);
    }
}

/// Write every rewritten stylesheet into `out_dir`, returning the paths written.
///
/// Each file keeps its path relative to the deepest directory shared by all inputs.
pub fn write_chunks(result: &SpritedBatch, out_dir: &Path) -> Result<Vec<PathBuf>, OutputError> {
    let outputs: Vec<_> = result
        .chunks
        .iter()
        .filter_map(|chunk| Some((chunk.path.as_path(), chunk.contents.as_deref()?)))
        .collect();
    let root = common_parent(outputs.iter().map(|&(path, _)| path));

    let mut planned: Vec<(PathBuf, &[u8])> = Vec::with_capacity(outputs.len());
    for (input, contents) in outputs {
        let path = generate_output_path(input, &root, Some(out_dir));
        if planned.iter().any(|(existing, _)| *existing == path) {
            return Err(OutputError::Collision { path });
        }
        planned.push((path, contents));
    }

    let mut written = Vec::with_capacity(planned.len());
    for (path, contents) in planned {
        write_file(contents, &path)?;
        log::info!("wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "spriter",
            "css/*.css",
            "--include-mode",
            "explicit",
            "--algorithm",
            "binary-tree",
            "--padding",
            "2",
            "--strict-images",
            "--no-verify",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.inputs, vec!["css/*.css".to_string()]);
        assert_eq!(cli.include_mode, Some(IncludeMode::Explicit));
        assert_eq!(cli.algorithm, Some(PackAlgorithm::Shelf));
        assert_eq!(cli.verbose, 2);

        let overrides = cli.overrides();
        assert_eq!(overrides.silent, Some(false));
        assert_eq!(overrides.verify_images, Some(false));
        assert_eq!(overrides.strict_parse, None);
        assert_eq!(overrides.padding, Some(2));
    }

    #[test]
    fn test_invalid_include_mode_rejected() {
        let result = Cli::try_parse_from(["spriter", "a.css", "--include-mode", "sometimes"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_inputs_required() {
        assert!(Cli::try_parse_from(["spriter"]).is_err());
    }

    #[test]
    fn test_sheet_conflicts_with_no_sheet() {
        assert!(Cli::try_parse_from(["spriter", "a.css", "--sheet", "s.png", "--no-sheet"]).is_err());
    }

    #[test]
    fn test_expand_inputs_globs_and_dedups() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.css"), "").unwrap();
        fs::write(temp.path().join("b.css"), "").unwrap();
        fs::write(temp.path().join("notes.txt"), "").unwrap();

        let a = temp.path().join("a.css").display().to_string();
        let pattern = temp.path().join("*.css").display().to_string();
        let paths = expand_inputs(&[a, pattern]).unwrap();

        assert_eq!(paths, vec![temp.path().join("a.css"), temp.path().join("b.css")]);
    }

    #[test]
    fn test_expand_inputs_no_match() {
        let temp = TempDir::new().unwrap();
        let pattern = temp.path().join("*.css").display().to_string();
        assert!(expand_inputs(&[pattern]).unwrap_err().starts_with("No files match"));
    }
}
