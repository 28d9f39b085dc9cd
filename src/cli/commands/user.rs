use clap::Subcommand;
use serde_json::json;

use crate::auth::new_user;
use crate::cli::utils::{output_list, output_success};
use crate::cli::{open_store, OutputFormat};
use crate::config::AppConfig;
use crate::database::models::ANONYMOUS;
use crate::database::Store;

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create a user account")]
    Add {
        #[arg(help = "Username")]
        username: String,

        #[arg(long, env = "SMT_PASSWORD", help = "Password (or set SMT_PASSWORD)")]
        password: String,
    },

    #[command(about = "List user accounts")]
    List,
}

pub async fn handle(cmd: UserCommands, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config).await?;

    match cmd {
        UserCommands::Add { username, password } => {
            if username == ANONYMOUS {
                anyhow::bail!("'{}' is reserved for public access", ANONYMOUS);
            }
            if username.trim().is_empty() || password.is_empty() {
                anyhow::bail!("username and password must not be empty");
            }
            store.create_user(new_user(&username, &password, config.security.password_cost)?).await?;
            output_success(
                &output_format,
                &format!("Created user '{}'", username),
                Some(json!({ "username": username })),
            )
        }
        UserCommands::List => {
            let users = store.list_users().await?;
            output_list(&output_format, "users", &users)
        }
    }
}
