//! CLI struct definitions for the archgov command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "archgov",
    version = env!("CARGO_PKG_VERSION"),
    about = "Resolve layered architecture definitions and validate source files against their constraints."
)]
pub(crate) struct Cli {
    /// Project root (defaults to the current directory).
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Print the flattened constraint set of an architecture
    Resolve(ResolveCli),
    /// Validate files (all discovered files when no path is given)
    Check(CheckCli),
    /// Re-validate files as they change
    Watch(WatchCli),
    /// Report override health and recurring overrides
    Audit(FormatCli),
    /// Inspect or clear the persistent validation cache
    Cache(CacheCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct ResolveCli {
    /// Architecture id as written in `@arch` tags.
    pub arch_id: String,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug)]
pub(crate) struct CheckCli {
    /// Files to validate, relative to the project root.
    pub paths: Vec<PathBuf>,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
    /// Exit non-zero when any file has warnings.
    #[clap(long)]
    pub fail_on_warning: bool,
    /// Skip the persistent cache for this run.
    #[clap(long)]
    pub no_cache: bool,
    /// Also list passing files and cache statistics.
    #[clap(long, short = 'v')]
    pub verbose: bool,
}

#[derive(clap::Args, Debug)]
pub(crate) struct WatchCli {
    /// Quiet period before a changed file is re-validated.
    #[clap(long, default_value_t = 300)]
    pub debounce_ms: u64,
}

#[derive(clap::Args, Debug)]
pub(crate) struct FormatCli {
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug)]
pub(crate) struct CacheCli {
    #[clap(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum CacheCommand {
    /// Show the cache location and entry count
    Stats(FormatCli),
    /// Delete the cache file
    Clear,
}
