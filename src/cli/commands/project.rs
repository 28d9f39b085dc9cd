use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::{open_store, OutputFormat};
use crate::config::AppConfig;
use crate::database::models::ANONYMOUS;
use crate::database::{Store, StoreError};

#[derive(Subcommand)]
pub enum ProjectCommands {
    #[command(about = "Grant a user access to a project")]
    Grant {
        #[arg(help = "Project id")]
        project: String,

        #[arg(help = "Username")]
        username: String,
    },

    #[command(about = "Make a project readable by anyone")]
    Publish {
        #[arg(help = "Project id")]
        project: String,
    },
}

pub async fn handle(cmd: ProjectCommands, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config).await?;

    let (project, username) = match cmd {
        ProjectCommands::Grant { project, username } => (project, username),
        ProjectCommands::Publish { project } => (project, ANONYMOUS.to_string()),
    };

    match store.grant_permission(&project, &username).await {
        Ok(()) => {}
        Err(StoreError::ProjectNotFound(id)) => anyhow::bail!("project '{}' does not exist", id),
        Err(StoreError::UserNotFound(name)) => anyhow::bail!("user '{}' does not exist", name),
        Err(e) => return Err(e.into()),
    }

    let message = if username == ANONYMOUS {
        format!("Project '{}' is now public", project)
    } else {
        format!("Granted '{}' access to project '{}'", username, project)
    };
    output_success(
        &output_format,
        &message,
        Some(json!({ "project": project, "user": username })),
    )
}
