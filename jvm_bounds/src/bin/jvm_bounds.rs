#![deny(clippy::expect_used)]
//! jvm-bounds command-line interface
//!
//! Usage:
//!   jvm-bounds classes/                     # Analyse every class under a directory
//!   jvm-bounds A.class B.class              # Analyse individual class files
//!   jvm-bounds app.jar                      # Analyse every class in a jar
//!   jvm-bounds --format json program.json   # Pre-lowered IR, JSON output
//!
//! All inputs together form the closed set of analysed classes. Calls into
//! any other class are treated as opaque.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use jvm_bounds::analysis::{DEFAULT_MAX_LOOP_ITERATIONS, DEFAULT_MAX_RECURSION_ITERATIONS};
use jvm_bounds::{analyze, AnalysisConfig, Repository};
use log::{info, LevelFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// One `file:line in method` line per finding
    Text,
    /// The full outcome, including statistics, as JSON
    Json,
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Report JVM array accesses that may be out of bounds")]
struct Cli {
    /// Class files, jars, JSON IR files or directories
    #[arg(required = true, value_name = "PATH")]
    inputs: Vec<PathBuf>,

    /// Cap on re-interpretations of one loop body
    #[arg(long, value_name = "INT", default_value_t = DEFAULT_MAX_LOOP_ITERATIONS)]
    max_loop_iterations: usize,

    /// Cap on re-analyses of one recursive method
    #[arg(long, value_name = "INT", default_value_t = DEFAULT_MAX_RECURSION_ITERATIONS)]
    max_recursion_iterations: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    simplelog::TermLogger::init(
        level(cli.verbose),
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    // Every input is loaded before analysis starts.
    let mut repository = Repository::new();
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for input in &cli.inputs {
        let loaded = repository
            .load_path(input)
            .wrap_err_with(|| format!("failed to load {}", input.display()))?;
        names.extend(loaded.into_iter().filter(|name| seen.insert(name.clone())));
    }
    info!("loaded {} classes from {} inputs", names.len(), cli.inputs.len());

    let config = AnalysisConfig::default()
        .with_max_loop_iterations(cli.max_loop_iterations)
        .with_max_recursion_iterations(cli.max_recursion_iterations);
    let outcome = analyze(&repository, &names, &config).wrap_err("analysis aborted")?;

    match cli.format {
        Format::Text => print!("{outcome}"),
        Format::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["jvm-bounds", "classes"]).unwrap();
        assert_eq!(cli.max_loop_iterations, DEFAULT_MAX_LOOP_ITERATIONS);
        assert_eq!(cli.format, Format::Text);
        assert_eq!(level(cli.verbose), LevelFilter::Warn);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "jvm-bounds",
            "-vv",
            "--format",
            "json",
            "--max-recursion-iterations",
            "3",
            "a.class",
            "b.class",
        ])
        .unwrap();
        assert_eq!(cli.inputs.len(), 2);
        assert_eq!(cli.format, Format::Json);
        assert_eq!(cli.max_recursion_iterations, 3);
        assert_eq!(level(cli.verbose), LevelFilter::Debug);
    }

    #[test]
    fn test_inputs_required_and_unknown_flags_rejected() {
        assert!(Cli::try_parse_from(["jvm-bounds"]).is_err());
        assert!(Cli::try_parse_from(["jvm-bounds", "--bogus", "a.class"]).is_err());
    }
}
