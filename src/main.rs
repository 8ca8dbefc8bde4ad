//! # GitHub Sync Main Entry Point
//!
//! `serve` (default) runs the HTTP API and `migrate` applies pending migrations.

use anyhow::Context;
use clap::{Parser, Subcommand};
use github_sync::{
    config::ConfigLoader,
    db,
    migration::{Migrator, MigratorTrait},
    server::run_server,
    telemetry,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "github-sync", version, about = "Mirror GitHub data into a local store")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run migrations, then serve the HTTP API
    Serve,
    /// Apply pending migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load().context("loading configuration")?;
    config.validate().context("validating configuration")?;
    telemetry::init_tracing(&config).context("initializing tracing")?;

    if let Ok(redacted_json) = config.redacted_json() {
        tracing::info!(profile = %config.profile, config = %redacted_json, "Loaded configuration");
    }

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            Migrator::up(&db, None).await.context("running migrations")?;
            run_server(config, db, CancellationToken::new()).await
        }
        Command::Migrate => {
            Migrator::up(&db, None).await.context("running migrations")?;
            tracing::info!("Migrations applied");
            Ok(())
        }
    }
}
