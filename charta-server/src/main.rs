use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use charta_core::{check_status, create_vision, ChartVision, ChartaConfig, OllamaClient};
use charta_server::http::{start_http_server, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "charta.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match ChartaConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    if args.health {
        let client = OllamaClient::new(config.ollama.clone())?;
        let status = check_status(&client).await;
        if status.available {
            println!("✅ Ollama reachable at {}", config.ollama.base_url);
            println!("✅ Installed models: {}", status.models.join(", "));
        } else {
            println!("❌ Ollama not reachable at {}", config.ollama.base_url);
            std::process::exit(1);
        }
        return Ok(());
    }

    // Load the chart-to-text model up front so a missing model file fails fast.
    let vision: Arc<dyn ChartVision> = match create_vision(&config.vision) {
        Ok(v) => Arc::from(v),
        Err(e) => {
            eprintln!("Failed to load chart-to-text model: {}", e);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::new(config, vision)?);

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
