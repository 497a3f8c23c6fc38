//! voxchat server binary

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use voxchat_config::load_settings;
use voxchat_llm::{BackendConfig, OpenRouterBackend};
use voxchat_pipeline::{HttpSpeechTts, HttpWhisperAsr};
use voxchat_server::{create_router, init_metrics, AppState};

#[derive(Parser, Debug)]
#[command(name = "voxchat", about = "Bilingual interactive voice assistant server")]
struct Cli {
    /// Bind address (overrides configuration)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides configuration)
    #[arg(long)]
    port: Option<u16>,

    /// Path to a TOML or YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut settings =
        load_settings(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    settings.validate().context("invalid configuration")?;

    init_metrics();

    let llm = Arc::new(
        OpenRouterBackend::new(BackendConfig::from(&settings.llm))
            .context("failed to create LLM backend")?,
    );
    let asr = Arc::new(
        HttpWhisperAsr::new(&settings.asr.endpoint, &settings.asr.whisper_model_size)
            .map_err(|e| anyhow::anyhow!("failed to create ASR adapter: {e}"))?,
    );
    let tts = Arc::new(HttpSpeechTts::new(
        &settings.tts.endpoint,
        settings.audio.sample_rate_out,
    ));

    tracing::info!(
        model = %settings.llm.model,
        asr = %settings.asr.engine,
        "adapters initialized"
    );

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("invalid bind address")?;

    let state = AppState::new(settings, asr, tts, llm);
    let router = create_router(state);

    tracing::info!(%addr, "voxchat listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind")?;
    axum::serve(listener, router)
        .await
        .context("server error")?;

    Ok(())
}
