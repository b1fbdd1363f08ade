mod config;
mod db;
mod relay;
mod routes;
mod state;
mod ws;

use tokio::net::TcpListener;

use config::{generate_config_template, Config};
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "telecare_relay=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "telecare_relay=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Telecare relay v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite message database
    let db = db::init_db(&config.data_dir)?;

    // Wire up shared state: connection registry, presence directory,
    // message store, relay engine
    let state = AppState::new(db);

    let app = routes::build_router(state);

    let listen_addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&listen_addr).await?;
    tracing::info!("Relay listening on {}", listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
