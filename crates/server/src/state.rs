use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::service::SearchService;
use clip::{ClipConfig, ClipModel, Embedder, StubEmbedder};
use index::{Artifacts, CaptionStore};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Retrieval core (shared across requests)
    pub service: Arc<SearchService>,
}

impl ServerState {
    /// Create new server state: load the encoder, the serving artifacts and
    /// the caption file. Any missing piece fails startup.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let embedder: Arc<dyn Embedder> = if config.stub_embedder {
            tracing::warn!("stub embedder enabled; results will not be visually meaningful");
            Arc::new(StubEmbedder::new())
        } else {
            let clip_config = ClipConfig {
                model_name: config.model_name.clone(),
                models_dir: config.model_dir.clone(),
            };
            Arc::new(ClipModel::new(&clip_config)?)
        };

        let artifacts = Artifacts::load(&config.artifact_dir)?;
        let captions = CaptionStore::load(&config.captions_file)?;

        if !config.images_dir.is_dir() {
            return Err(ServerError::Config(format!(
                "images_dir {} is not a directory",
                config.images_dir.display()
            )));
        }

        let service = SearchService::new(embedder, artifacts, captions)?;

        Ok(Self {
            config: Arc::new(config),
            service: Arc::new(service),
        })
    }

    /// Build state from preconstructed parts. Used by tests and by callers
    /// that assemble the service themselves.
    pub fn from_parts(config: ServerConfig, service: SearchService) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(service),
        }
    }
}
