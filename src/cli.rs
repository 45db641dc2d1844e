use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediawatch")]
#[command(about = "Watches media folders and asks Plex to refresh what changed")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Watch every configured root and dispatch refreshes
    Run(RunArgs),

    /// Scan one tree and diff it against its stored snapshot
    Scan(ScanArgs),

    /// Show which library a path belongs to
    Resolve(ResolveArgs),

    /// Remove old snapshot files
    Clean,

    /// List the media server's libraries
    Libraries(LibrariesArgs),
}

#[derive(Parser)]
pub struct RunArgs {
    /// Run one cycle and exit
    #[arg(long, default_value_t = false)]
    pub once: bool,

    /// Output the cycle report as JSON (with --once)
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ScanArgs {
    /// Tree to scan
    pub root: PathBuf,

    /// Store the snapshot so the next scan diffs against it
    #[arg(long, default_value_t = false)]
    pub save: bool,

    /// Output as JSON instead of table
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Show detailed output including diagnostics
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,
}

#[derive(Parser)]
pub struct ResolveArgs {
    /// Path as the scanner sees it
    pub path: PathBuf,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct LibrariesArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
