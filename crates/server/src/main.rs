//! Buscador Server - HTTP API for cross-modal image retrieval
//!
//! Serves text and image similarity queries over a precomputed index.

use server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env first so the config layer sees its variables
    dotenvy::dotenv().ok();

    let config = ServerConfig::load()?;

    server::start_server(config).await?;

    Ok(())
}
