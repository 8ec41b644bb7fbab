use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB (image uploads)
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory with the serving artifacts produced by `buscador build-index`
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Directory with the ONNX encoders and tokenizer
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Registry name of the encoder to load
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Directory of image files served under /imagenes
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,

    /// Caption token file (`<image>#<n>\t<caption>` lines)
    #[serde(default = "default_captions_file")]
    pub captions_file: PathBuf,

    /// Use the deterministic stub embedder instead of the ONNX model.
    /// Smoke-test runs only; never ranks by visual similarity.
    #[serde(default)]
    pub stub_embedder: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            artifact_dir: default_artifact_dir(),
            model_dir: default_model_dir(),
            model_name: default_model_name(),
            images_dir: default_images_dir(),
            captions_file: default_captions_file(),
            stub_embedder: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and config files
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::with_name("buscador").required(false))
            // Override with environment variables
            .add_source(config::Environment::with_prefix("BUSCADOR").separator("__"));

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./artifacts")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("./models")
}

fn default_model_name() -> String {
    "clip-vit-base-patch32".to_string()
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("./images")
}

fn default_captions_file() -> PathBuf {
    PathBuf::from("./captions/Flickr8k.lemma.token.txt")
}
