use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "gkv",
    about = "gitkv: a key-value database stored in a git repository",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository as <owner>/<name>
    #[arg(long, global = true, env = "GH_REPO")]
    pub repo: Option<String>,

    /// Access token; writes need one
    #[arg(long, global = true, env = "GH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// JSON file holding the repository state between runs
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// TOML database configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Publish the type registry so the repository can hold keys
    Init,
    /// Remove stale keys
    Gc(GcArgs),
    /// Create stale keys, collect them, and check none survived
    StressGc(StressGcArgs),
    /// Show the type registry
    Types,
    /// Show the ids a file would be stored under
    Hash(HashArgs),
}

#[derive(Args, Debug)]
pub struct GcArgs {
    /// Keys removed per atomic update
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct StressGcArgs {
    #[arg(long, default_value = "200")]
    pub keys: usize,
}

#[derive(Args, Debug)]
pub struct HashArgs {
    pub file: PathBuf,
    /// Hash as a blob of this MIME type instead of raw bytes
    #[arg(long)]
    pub mime: Option<String>,
}
