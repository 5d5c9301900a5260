//! geonft - nftables sets from db-ip geolocation and ASN databases

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use geonft::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Generate(args) => geonft::commands::generate::run(args, &cli.config).await,
        Commands::Query { host } => geonft::commands::query::run(&host, &cli.config).await,
        Commands::Download => geonft::commands::download::run(&cli.config).await,
        Commands::Version => {
            println!("geonft {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
