//! edgeos-bouncer - CrowdSec bouncer for EdgeOS address groups
//!
//! Mirrors a CrowdSec decision feed into an EdgeRouter firewall address group.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use edgeos_bouncer::cli::{Cli, Commands};

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
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run => edgeos_bouncer::commands::run::run(&cli.config).await,
        Commands::Show { list } => edgeos_bouncer::commands::show::run(list, &cli.config).await,
        Commands::Sync { replace_all } => {
            edgeos_bouncer::commands::sync::run(replace_all, &cli.config).await
        }
        Commands::Version => {
            println!("edgeos-bouncer {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
