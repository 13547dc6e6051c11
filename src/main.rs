//! Homebase CLI binary entry point.

use clap::Parser;
use homebase::cli::{auth, Cli, Commands};
use homebase::client::SessionClient;
use homebase::config::SessionConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("homebase=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = SessionConfig::from_env();
    if let Some(base_url) = cli.base_url {
        config = config.with_base_url(base_url);
    }

    let client = match SessionClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Status => auth::handle_status(&client).await,
        Commands::Login(args) => auth::handle_login(&client, &args.phone).await,
        Commands::Logout => auth::handle_logout(&client).await,
        Commands::Get(args) => auth::handle_get(&client, &args.path).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
