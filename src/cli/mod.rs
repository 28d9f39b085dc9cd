pub mod commands;
pub mod utils;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::database::{DatabaseManager, PgStore};

#[derive(Parser)]
#[command(name = "smt-admin")]
#[command(about = "Sumatra server administration - schema, users and project permissions")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Create or upgrade the database schema")]
    Migrate,

    #[command(about = "User accounts")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Project permissions")]
    Project {
        #[command(subcommand)]
        cmd: commands::project::ProjectCommands,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Administrative commands always work against PostgreSQL
pub async fn open_store(config: &AppConfig) -> anyhow::Result<PgStore> {
    let pool = DatabaseManager::connect(&config.database)
        .await
        .context("connecting to the database (is DATABASE_URL set?)")?;
    DatabaseManager::migrate(&pool).await.context("applying schema")?;
    Ok(PgStore::new(pool))
}

pub async fn run(cli: Cli, config: &AppConfig) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Migrate => commands::migrate::handle(config, output_format).await,
        Commands::User { cmd } => commands::user::handle(cmd, config, output_format).await,
        Commands::Project { cmd } => commands::project::handle(cmd, config, output_format).await,
    }
}
