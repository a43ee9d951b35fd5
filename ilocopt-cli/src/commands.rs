// CLI command handlers
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use ilocopt_core::optimizer::{emitter, parser, pipeline};

/// Read, optimize, and emit one ILOC file.
pub fn optimize(
    iloc_file: &Path,
    passes: &str,
    debug: bool,
    stats_path: Option<&Path>,
) -> Result<()> {
    let selection = pipeline::PassSelection::parse(passes)
        .with_context(|| format!("invalid pass selection `{passes}`"))?;

    let source = fs::read_to_string(iloc_file)
        .with_context(|| format!("failed to read ILOC file: {}", iloc_file.display()))?;

    let program = parser::parse_program(&source)
        .with_context(|| format!("failed to parse {}", iloc_file.display()))?;
    info!(
        "parsed {} procedure(s) from {}",
        program.procedures.len(),
        iloc_file.display()
    );

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .expect("static template is valid"),
    );
    spinner.set_message(format!("running passes `{}`", selection.as_str()));

    let (program, stats) = pipeline::run(program, &selection)
        .context("optimization pipeline failed")?;

    spinner.finish_and_clear();

    if debug {
        eprint!("{}", emitter::emit_debug(&program));
    }
    print!("{}", emitter::emit(&program));

    if let Some(path) = stats_path {
        let json = serde_json::to_string_pretty(&stats).context("failed to encode stats")?;
        fs::write(path, json)
            .with_context(|| format!("failed to write stats to {}", path.display()))?;
    }

    Ok(())
}
