//! spriter - combine CSS background images into a sprite sheet

use std::process::ExitCode;

use css_spriter::cli;

fn main() -> ExitCode {
    cli::run()
}
