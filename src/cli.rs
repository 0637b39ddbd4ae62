use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fetchpool")]
#[command(about = "Concurrent HTTP fetcher draining a growable task queue", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch tasks and print each delivered result as a JSON line
    Fetch(FetchArgs),
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// URLs to fetch
    pub urls: Vec<String>,

    /// File with one task per line: a URL or a JSON task object
    #[arg(long, short)]
    pub input: Option<PathBuf>,

    /// Override dispatcher.max_workers
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Deliver failed and empty responses too
    #[arg(long)]
    pub no_check_result: bool,

    /// Queue URLs found in a JSON response's `urls` array
    #[arg(long)]
    pub follow_json_urls: bool,

    /// Print each request with its params to stderr before sending
    #[arg(long)]
    pub debug: bool,

    /// Configuration file (defaults to $FETCHPOOL_CONFIG or config/fetchpool.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
