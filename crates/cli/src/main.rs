//! Offline tooling for the buscador retrieval service.
//!
//! `buscador build-index` embeds a dataset split and writes the serving
//! artifacts; `buscador evaluate` scores retrieval quality against expert
//! relevance annotations. Both run the same encoder the server uses.

mod build_index;
mod evaluate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use clip::{ClipConfig, ClipModel, Embedder, StubEmbedder};

#[derive(Parser)]
#[command(name = "buscador", version, about = "Offline indexing and evaluation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed a dataset split and write the serving artifacts
    BuildIndex(build_index::BuildIndexArgs),
    /// Score retrieval quality against expert annotations
    Evaluate(evaluate::EvaluateArgs),
}

/// Encoder options shared by both subcommands.
#[derive(Debug, clap::Args)]
struct EncoderArgs {
    /// Directory with the ONNX encoders and tokenizer
    #[arg(long, default_value = "./models")]
    model_dir: PathBuf,

    /// Registry name of the encoder to load
    #[arg(long, default_value = "clip-vit-base-patch32")]
    model_name: String,

    /// Use the deterministic stub embedder (no model assets needed)
    #[arg(long)]
    stub: bool,
}

impl EncoderArgs {
    fn build(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        if self.stub {
            tracing::warn!("stub embedder enabled; artifacts will not be visually meaningful");
            return Ok(Arc::new(StubEmbedder::new()));
        }
        let config = ClipConfig {
            model_name: self.model_name.clone(),
            models_dir: self.model_dir.clone(),
        };
        let model = ClipModel::new(&config).context("failed to load encoder")?;
        Ok(Arc::new(model))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::BuildIndex(args) => build_index::run(args),
        Command::Evaluate(args) => evaluate::run(args),
    }
}
