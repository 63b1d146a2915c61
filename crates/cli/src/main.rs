// schemata
// Tenant lifecycle and schema migration commands

mod cli;
mod commands;
mod prompt;

use anyhow::Context;
use clap::{error::ErrorKind, CommandFactory, Parser};
use cli::Cli;
use commands::App;
use dotenvy::dotenv;
use schemata_database::{Database, DatabaseConfig, TenancyConfig};

/// Exit with a clap usage error (status 2).
pub(crate) fn usage_error(message: &str) -> ! {
    Cli::command()
        .error(ErrorKind::MissingRequiredArgument, message)
        .exit()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,schemata=debug".into()),
        )
        .init();

    let config = TenancyConfig::load().context("Invalid tenancy configuration")?;
    tracing::debug!(
        engine = %config.engine,
        public_schema = %config.public_schema,
        "Configuration loaded"
    );

    let database = Database::new(DatabaseConfig::from_env())
        .await
        .context("Failed to connect to database")?;

    let app = App::new(config, database, cli.no_input);
    app.check_startup().await?;

    let outcome = commands::run(&app, cli.command).await;
    app.database().close().await;
    outcome
}
