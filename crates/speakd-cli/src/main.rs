//! CLI entry point — the composition root for the speakd server.
//!
//! Parses flags (with env fallbacks), validates the credential, and hands
//! a fully-built `ServerConfig` to the Axum adapter. The credential check
//! happens before the listener binds: a misconfigured process must die
//! loudly at startup, not 500 on its first request.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use speakd_audio::decoder::DecoderCommand;
use speakd_axum::{ServerConfig, start_server};
use speakd_core::{CoordinatorConfig, OnBusyPolicy, RetryPolicy};

/// Fatal startup errors. Anything here exits the process before it
/// accepts requests.
#[derive(Debug, Error)]
enum ConfigError {
    #[error(
        "SPEAKD_API_KEY is not set — export it or add it to a .env file \
         (the LLM/TTS backend credential)"
    )]
    MissingApiKey,
}

/// Busy-slot policy flag, mirrored onto [`OnBusyPolicy`].
#[derive(Debug, Clone, Copy, ValueEnum)]
enum BusyPolicyArg {
    /// Reject a start while a session is active (409).
    Reject,
    /// Stop the active session, then start the new one.
    Preempt,
}

impl From<BusyPolicyArg> for OnBusyPolicy {
    fn from(arg: BusyPolicyArg) -> Self {
        match arg {
            BusyPolicyArg::Reject => Self::Reject,
            BusyPolicyArg::Preempt => Self::Preempt,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "speakd")]
#[command(about = "Streaming voice assistant server: text in, near-realtime speech out")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value = "8001", env = "SPEAKD_PORT")]
    port: u16,

    /// Credential for the LLM/TTS backend
    #[arg(long, env = "SPEAKD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Streaming chat-completion endpoint
    #[arg(long, env = "SPEAKD_CHAT_URL")]
    chat_url: Option<String>,

    /// Streaming speech-synthesis endpoint
    #[arg(long, env = "SPEAKD_SPEECH_URL")]
    speech_url: Option<String>,

    /// Language model to converse with
    #[arg(long, env = "SPEAKD_MODEL")]
    model: Option<String>,

    /// Synthesis voice
    #[arg(long, env = "SPEAKD_VOICE")]
    voice: Option<String>,

    /// What /start does while a session is active
    #[arg(long, value_enum, default_value = "reject", env = "SPEAKD_ON_BUSY")]
    on_busy: BusyPolicyArg,

    /// Seconds /stop waits for the worker before aborting it
    #[arg(long, default_value = "5", env = "SPEAKD_STOP_TIMEOUT_SECS")]
    stop_timeout_secs: u64,

    /// Decoder binary used for the audio pipe
    #[arg(long, default_value = "ffmpeg", env = "SPEAKD_FFMPEG")]
    ffmpeg: String,
}

impl Args {
    fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        let api_key = match self.api_key {
            Some(key) if !key.trim().is_empty() => key,
            _ => return Err(ConfigError::MissingApiKey),
        };

        let mut config = ServerConfig::with_defaults(api_key);
        config.port = self.port;
        if let Some(url) = self.chat_url {
            config.backend.chat_url = url;
        }
        if let Some(url) = self.speech_url {
            config.backend.speech_url = url;
        }
        if let Some(model) = self.model {
            config.backend.model = model;
        }
        if let Some(voice) = self.voice {
            config.backend.voice = voice;
        }
        config.decoder = DecoderCommand::ffmpeg(self.ffmpeg, config.backend.sample_rate);
        config.coordinator = CoordinatorConfig {
            on_busy: self.on_busy.into(),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            retry: RetryPolicy::default(),
        };
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = args.into_server_config().inspect_err(|e| {
        tracing::error!("{e}");
    })?;

    start_server(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["speakd", "--api-key", "test-key"])
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let args = Args::parse_from(["speakd"]);
        // The env fallback may leak into the test environment; only assert
        // when the key is genuinely absent.
        if args.api_key.is_none() {
            assert!(matches!(args.into_server_config(), Err(ConfigError::MissingApiKey)));
        }
    }

    #[test]
    fn blank_api_key_is_fatal() {
        let args = Args::parse_from(["speakd", "--api-key", "  "]);
        assert!(matches!(args.into_server_config(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn defaults_produce_a_reject_policy_config() {
        let config = base_args().into_server_config().unwrap();
        assert_eq!(config.port, 8001);
        assert!(matches!(config.coordinator.on_busy, OnBusyPolicy::Reject));
        assert_eq!(config.coordinator.stop_timeout, Duration::from_secs(5));
        assert_eq!(config.decoder.program, "ffmpeg");
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "speakd",
            "--api-key",
            "k",
            "--port",
            "9900",
            "--on-busy",
            "preempt",
            "--model",
            "qwen-turbo",
            "--ffmpeg",
            "/opt/ffmpeg/bin/ffmpeg",
        ]);
        let config = args.into_server_config().unwrap();
        assert_eq!(config.port, 9900);
        assert!(matches!(config.coordinator.on_busy, OnBusyPolicy::Preempt));
        assert_eq!(config.backend.model, "qwen-turbo");
        assert_eq!(config.decoder.program, "/opt/ffmpeg/bin/ffmpeg");
    }
}
