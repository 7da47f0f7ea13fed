//! Backend configuration shared by both collaborator clients.

use std::time::Duration;

/// Connection settings for the LLM/TTS backend.
///
/// One credential covers both collaborators; the URLs point at an
/// OpenAI-compatible API surface. Request timeouts cover connection
/// establishment only — response bodies are open-ended streams and must
/// not be bounded by a whole-request deadline.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Bearer credential for both collaborators.
    pub api_key: String,
    /// Full URL of the streaming chat-completion endpoint.
    pub chat_url: String,
    /// Full URL of the streaming speech-synthesis endpoint.
    pub speech_url: String,
    /// Model identifier sent with chat requests.
    pub model: String,
    /// Voice identifier sent with synthesis requests.
    pub voice: String,
    /// Compressed audio container requested from the synthesizer.
    pub audio_format: String,
    /// Sample rate requested from the synthesizer (must match the player's
    /// decode rate).
    pub sample_rate: u32,
    /// System prompt prepended to every chat request.
    pub system_prompt: String,
    /// TCP connect deadline for both endpoints.
    pub connect_timeout: Duration,
}

impl BackendConfig {
    /// Config for the public DashScope OpenAI-compatible surface, which the
    /// default model/voice names belong to. Point the URLs elsewhere for
    /// any other OpenAI-compatible backend.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            chat_url: "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
                .to_string(),
            speech_url: "https://dashscope.aliyuncs.com/compatible-mode/v1/audio/speech"
                .to_string(),
            model: "qwen-plus".to_string(),
            voice: "longhua_v2".to_string(),
            audio_format: "mp3".to_string(),
            sample_rate: 22_050,
            system_prompt: "You are a friendly small-talk voice assistant. Reply in short, \
                            natural spoken language. Never use markdown formatting or lists."
                .to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}
