use crate::cli::utils::output_success;
use crate::cli::{open_store, OutputFormat};
use crate::config::AppConfig;

pub async fn handle(config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    // open_store applies the schema
    open_store(config).await?;
    output_success(&output_format, "Database schema is up to date", None)
}
