use clap::Parser;
use tracing_subscriber::EnvFilter;

mod backend;
mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ordinal=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(backend = %backend::backend_label(&cli.store), "Opening store");
    let collection = backend::open_collection(&cli.store).await?;

    match &cli.command {
        Commands::Containers => commands::show::containers(&collection, cli.format).await?,
        Commands::List { container } => {
            commands::show::list(&collection, container, cli.format).await?
        }
        command => commands::moves::run(&collection, command, cli.format).await?,
    }
    if cli.command.is_mutating() {
        backend::persist(&cli.store, &collection).await?;
    }

    Ok(())
}
