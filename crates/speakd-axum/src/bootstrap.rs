//! Axum server bootstrap — the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together
//! for the web adapter: the streaming collaborator clients, the local
//! audio pipeline, and the session coordinator are all instantiated here.

use std::sync::Arc;

use anyhow::Result;

use speakd_audio::decoder::DecoderCommand;
use speakd_audio::player::LocalAudioOutput;
use speakd_backend::{BackendConfig, ChatClient, SynthesisClient};
use speakd_core::{AudioOutputPort, CoordinatorConfig, SessionCoordinator};

/// CORS configuration for the web server.
#[derive(Debug, Clone, Default)]
pub enum CorsConfig {
    /// Allow all origins (development mode).
    #[default]
    AllowAll,
    /// Allow specific origins (production mode).
    AllowOrigins(Vec<String>),
}

/// Server configuration for the Axum adapter.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for the HTTP server.
    pub port: u16,
    /// Collaborator backend settings (credential, endpoints, model, voice).
    pub backend: BackendConfig,
    /// Decode command for the streaming player.
    pub decoder: DecoderCommand,
    /// Coordinator tuning (busy policy, stop timeout, retries).
    pub coordinator: CoordinatorConfig,
    /// CORS configuration.
    pub cors: CorsConfig,
}

impl ServerConfig {
    /// Config with default endpoints, decoder, and policies for the given
    /// credential.
    #[must_use]
    pub fn with_defaults(api_key: impl Into<String>) -> Self {
        Self {
            port: 8001,
            backend: BackendConfig::new(api_key),
            decoder: DecoderCommand::default(),
            coordinator: CoordinatorConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

/// Application context for the Axum adapter.
pub struct AxumContext {
    /// The process-wide session coordinator.
    pub coordinator: Arc<SessionCoordinator>,
}

/// Wire the production adapters into a coordinator.
pub fn bootstrap(config: &ServerConfig) -> Result<AxumContext> {
    let llm = Arc::new(ChatClient::new(config.backend.clone())?);
    let tts = Arc::new(SynthesisClient::new(config.backend.clone())?);
    let output: Arc<dyn AudioOutputPort> = Arc::new(LocalAudioOutput::new(
        config.decoder.clone(),
        config.backend.sample_rate,
    ));

    let coordinator = Arc::new(SessionCoordinator::new(llm, tts, output, config.coordinator));

    tracing::info!(
        chat_url = %config.backend.chat_url,
        speech_url = %config.backend.speech_url,
        model = %config.backend.model,
        voice = %config.backend.voice,
        decoder = %config.decoder.program,
        on_busy = ?config.coordinator.on_busy,
        "speakd bootstrap complete"
    );

    Ok(AxumContext { coordinator })
}

/// Start the web server on the configured port. Runs until the process is
/// terminated.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    use tokio::net::TcpListener;

    let ctx = bootstrap(&config)?;
    let app = crate::routes::create_router(ctx, &config.cors);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("speakd listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
