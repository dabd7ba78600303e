use clap::Parser;
use neutree_core::settings::{Cli, Command, Settings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = cli
        .log_level
        .clone()
        .unwrap_or_else(|| "neutree_core=info,tower_http=info,warn".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or(default_filter),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = match Settings::load(&cli) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(Command::ValidateConfig) = cli.command {
        tracing::info!("configuration is valid");
        println!("configuration OK");
        return;
    }

    tracing::info!(
        "starting neutree-core on {}:{}",
        settings.server.host,
        settings.server.port
    );

    if let Err(e) = neutree_core::run_server(settings).await {
        tracing::error!("server exited with error: {}", e);
        std::process::exit(1);
    }
}
