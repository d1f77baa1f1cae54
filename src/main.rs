pub mod api;
pub mod config;
pub mod db;
pub mod error;

use tracing_subscriber::EnvFilter;

use crate::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,restaurant=debug,tower_http=debug")),
        )
        .with_target(true)
        .init();

    tracing::info!("Starting restaurant backend...");

    let settings = Settings::load()?;
    api::server::start_server(settings).await
}
