// CLI driver
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(name = "ilocopt")]
#[command(about = "Optimizing back end for the ILOC intermediate language")]
#[command(version)]
struct Cli {
    /// Path to the ILOC source file
    iloc_file: PathBuf,

    /// Pass selection: a string over {l: lvn, s: ssa, d: dead code,
    /// r: register allocation}, run in the given order
    #[arg(default_value = "lsdr")]
    passes: String,

    /// Dump the annotated IR (full SSA names, deleted instructions,
    /// phi nodes) to stderr after the passes run
    #[arg(long)]
    debug: bool,

    /// Write pipeline statistics as JSON to the given file
    #[arg(long, value_name = "FILE")]
    stats: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap renders its own message; both usage and parse failures
            // exit with status 1
            eprint!("{err}");
            return ExitCode::from(1);
        }
    };

    match commands::optimize(&cli.iloc_file, &cli.passes, cli.debug, cli.stats.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}
