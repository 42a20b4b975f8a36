//! git-mediate command-line tool.
//!
//! Invoked by git as `git mediate <target>`: reports which commits on the
//! target branch would conflict with the current branch if the two were
//! merged. Nothing in the repository is modified.

mod render;
mod style;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gitmediate_core::{
    BranchRef, FilterPolicy, GitCli, GitOracle, MediateConfig, MediateEngine, MediateError,
};

use render::OutputFormat;

/// Environment variable holding a tracing filter for the CLI.
const LOG_ENV: &str = "GIT_MEDIATE_LOG";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Identify the commits that cause merge conflicts before merging branches.
#[derive(Parser, Debug)]
#[command(name = "git-mediate", version)]
struct Cli {
    /// The branch to check for conflicts against, or a `source..target` range.
    target: String,

    /// Branch to compare from instead of the current branch.
    #[arg(long)]
    source: Option<String>,

    /// Show the extraction method and conflicting lines for each file.
    #[arg(short, long)]
    verbose: bool,

    /// Log engine internals to stderr.
    #[arg(long)]
    debug: bool,

    /// Print the report as JSON.
    #[arg(long, conflicts_with = "table")]
    json: bool,

    /// Print attributed commits as a table.
    #[arg(long)]
    table: bool,

    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep commits that the source branch already contains.
    #[arg(long)]
    merges_only: bool,

    /// Do not compare against source-side line history.
    #[arg(long)]
    no_source_blame: bool,
}

impl Cli {
    fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else if self.table {
            OutputFormat::Table {
                verbose: self.verbose,
            }
        } else {
            OutputFormat::Text {
                verbose: self.verbose,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            return ExitCode::FAILURE;
        }
    };
    init_tracing(cli.debug, &config.log_level);

    match run(&cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            if let Some(MediateError::SameRef(_)) = e.downcast_ref::<MediateError>() {
                eprintln!("Please checkout a different branch or specify a different target branch.");
            }
            ExitCode::FAILURE
        }
    }
}

/// Filter precedence: `--debug`, then `GIT_MEDIATE_LOG`, then the config.
fn init_tracing(debug: bool, config_level: &str) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(config_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(cli: &Cli) -> Result<MediateConfig> {
    let mut config = match &cli.config {
        Some(path) => MediateConfig::load_from_file(path).context("failed to load configuration file")?,
        None => MediateConfig::default(),
    };
    if cli.merges_only {
        config.filter_policy = FilterPolicy::MergesOnly;
    }
    if cli.no_source_blame {
        config.compare_source_blame = false;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Work out the source and target refs from the arguments.
fn select_refs<O: GitOracle>(cli: &Cli, engine: &MediateEngine<O>) -> Result<(BranchRef, BranchRef)> {
    if let Some((source, target)) = BranchRef::parse_range(&cli.target) {
        if cli.source.is_some() {
            bail!("--source cannot be combined with a range argument");
        }
        return Ok((source, target));
    }
    let source = match &cli.source {
        Some(name) => BranchRef::new(name.as_str()),
        None => engine.current_branch()?,
    };
    Ok((source, BranchRef::new(cli.target.as_str())))
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

fn run(cli: &Cli, config: MediateConfig) -> Result<()> {
    let work_dir = std::env::current_dir().context("failed to read current directory")?;
    let git = GitCli::new(config.git_binary.clone(), work_dir);
    let engine = MediateEngine::new(git, config);

    let toplevel = engine.ensure_repository()?;
    tracing::debug!(repo = %toplevel.display(), "repository found");

    let (source, target) = select_refs(cli, &engine)?;
    let format = cli.output_format();
    if format != OutputFormat::Json {
        println!("Checking for conflicts between {source} and {target}...");
        println!();
    }

    let report = engine.attribute(&source, &target)?;
    println!("{}", render::render(&report, format)?);
    Ok(())
}
