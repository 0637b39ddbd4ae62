mod cli;
mod fetch;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch(args) => fetch::run(args).await?,
    }

    Ok(())
}
