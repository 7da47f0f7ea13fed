//! Streaming speech-synthesis client (`SpeechSynthesizerPort`
//! implementation).

use async_trait::async_trait;
use futures_util::StreamExt;

use speakd_core::{AudioChunk, AudioChunkStream, SpeechSynthesizerPort, StreamError};

use crate::config::BackendConfig;

const SERVICE: &str = "speech synthesis";

/// OpenAI-compatible streaming TTS client.
///
/// The endpoint returns the compressed audio as a chunked body; each
/// network chunk becomes one [`AudioChunk`] with an emission-order
/// sequence number. Dropping the returned stream closes the connection,
/// which stops further chunk delivery upstream.
pub struct SynthesisClient {
    http: reqwest::Client,
    config: BackendConfig,
}

impl SynthesisClient {
    /// Build the client.
    pub fn new(config: BackendConfig) -> Result<Self, StreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StreamError::Connect { service: SERVICE, message: e.to_string() })?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl SpeechSynthesizerPort for SynthesisClient {
    async fn stream_speech(&self, text: &str) -> Result<AudioChunkStream, StreamError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "input": text,
            "voice": self.config.voice,
            "response_format": self.config.audio_format,
            "sample_rate": self.config.sample_rate,
            "stream": true,
        });

        let response = self
            .http
            .post(&self.config.speech_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StreamError::Connect { service: SERVICE, message: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(StreamError::Connect {
                service: SERVICE,
                message: format!("HTTP {status}: {detail}"),
            });
        }

        tracing::debug!(voice = %self.config.voice, text_len = text.len(), "synthesis stream opened");

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut seq: u64 = 0;
            while let Some(part) = bytes.next().await {
                match part {
                    Ok(part) if part.is_empty() => {}
                    Ok(part) => {
                        yield Ok(AudioChunk { seq, bytes: part });
                        seq += 1;
                    }
                    Err(e) => {
                        yield Err(StreamError::Interrupted {
                            service: SERVICE,
                            message: e.to_string(),
                        });
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
