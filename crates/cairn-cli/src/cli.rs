use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cairn",
    about = "Cairn: a versioned, content-addressed database",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Sent as the Authorization header to every server.
    #[arg(long, global = true)]
    pub auth: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve an in-memory database over HTTP
    Serve(ServeArgs),
    /// Print a database's root hash
    Root(RootArgs),
    /// List a database's datasets and their heads
    Datasets(DatasetsArgs),
    /// Show a dataset's commit history
    Log(LogArgs),
    /// Pull a dataset from one database into another
    Sync(SyncArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML server config
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Overrides the config's bind address
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Overrides the config's namespace
    #[arg(long)]
    pub namespace: Option<String>,
    /// Accept unvalidated bulk imports on /postRefs
    #[arg(long)]
    pub trusted: bool,
}

#[derive(Args)]
pub struct RootArgs {
    pub url: String,
}

#[derive(Args)]
pub struct DatasetsArgs {
    pub url: String,
}

#[derive(Args)]
pub struct LogArgs {
    pub url: String,
    pub dataset: String,
    /// Show at most this many commits
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
    #[arg(long)]
    pub oneline: bool,
}

#[derive(Args)]
pub struct SyncArgs {
    pub source: String,
    pub sink: String,
    pub dataset: String,
    /// Chunks fetched at once while walking the source
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,
}
