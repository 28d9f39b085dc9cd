use clap::Parser;
use sumatra_server::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    sumatra_server::init_tracing();

    let cli = Cli::parse();
    let config = sumatra_server::config::config();

    if let Err(e) = sumatra_server::cli::run(cli, config).await {
        match std::env::var("SMT_VERBOSE").as_deref() {
            Ok("true") | Ok("1") => eprintln!("Error: {e:?}"),
            _ => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }

    Ok(())
}
