//! Buscador Server - HTTP API for cross-modal image retrieval
//!
//! This crate serves similarity queries over a precomputed image index:
//!
//! - **Text search**: `POST /buscar_por_texto` embeds a free-text query and
//!   returns the ten closest indexed images with their captions
//! - **Image search**: `POST /buscar_por_imagen` does the same for an
//!   uploaded example image
//! - **Static images**: indexed files are served under `/imagenes/{name}`
//! - **Health**: liveness and readiness probes
//!
//! The index, image names and captions are produced offline by the
//! `buscador build-index` job and loaded read-only at startup. The encoder
//! (ONNX vision and text sessions) is loaded eagerly, so a deployment with
//! missing assets fails fast instead of on the first query.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod service;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use service::{RankedImage, SearchService, DEFAULT_TOP_K};
pub use state::ServerState;
