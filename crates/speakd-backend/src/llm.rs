//! Streaming chat-completion client (`LanguageModelPort` implementation).

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;

use speakd_core::{LanguageModelPort, StreamError, TextDeltaStream};

use crate::config::BackendConfig;
use crate::sse::SseDecoder;

const SERVICE: &str = "language model";

/// OpenAI-compatible streaming chat client.
pub struct ChatClient {
    http: reqwest::Client,
    config: BackendConfig,
}

impl ChatClient {
    /// Build the client. Fails only if the underlying HTTP client cannot
    /// be constructed (TLS backend initialisation).
    pub fn new(config: BackendConfig) -> Result<Self, StreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StreamError::Connect { service: SERVICE, message: e.to_string() })?;
        Ok(Self { http, config })
    }
}

// ── Wire shapes ───────────────────────────────────────────────────────────────

/// One SSE event of a streaming chat completion (the fields we read).
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: DeltaMessage,
}

#[derive(Debug, Default, Deserialize)]
struct DeltaMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Parse one SSE payload into a text delta, if it carries one.
fn parse_delta(payload: &str) -> Result<Option<String>, StreamError> {
    let event: StreamEvent = serde_json::from_str(payload).map_err(|e| StreamError::Protocol {
        service: SERVICE,
        message: format!("bad stream event: {e}"),
    })?;
    Ok(event
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty()))
}

#[async_trait]
impl LanguageModelPort for ChatClient {
    async fn stream_reply(&self, prompt: &str) -> Result<TextDeltaStream, StreamError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "stream": true,
            "messages": [
                { "role": "system", "content": self.config.system_prompt },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .http
            .post(&self.config.chat_url)
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

        tracing::debug!(model = %self.config.model, "chat completion stream opened");

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            while let Some(part) = bytes.next().await {
                let part = match part {
                    Ok(part) => part,
                    Err(e) => {
                        yield Err(StreamError::Interrupted {
                            service: SERVICE,
                            message: e.to_string(),
                        });
                        return;
                    }
                };
                for payload in decoder.push(&part) {
                    if payload == "[DONE]" {
                        return;
                    }
                    match parse_delta(&payload) {
                        Ok(Some(delta)) => yield Ok(delta),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_content_is_extracted() {
        let payload = r#"{"choices":[{"delta":{"content":"Hel"},"index":0}]}"#;
        assert_eq!(parse_delta(payload).unwrap(), Some("Hel".to_string()));
    }

    #[test]
    fn role_only_delta_yields_nothing() {
        let payload = r#"{"choices":[{"delta":{"role":"assistant"},"index":0}]}"#;
        assert_eq!(parse_delta(payload).unwrap(), None);
    }

    #[test]
    fn finish_event_without_choices_yields_nothing() {
        let payload = r#"{"choices":[]}"#;
        assert_eq!(parse_delta(payload).unwrap(), None);
    }

    #[test]
    fn malformed_json_is_a_protocol_error() {
        let err = parse_delta("not json").unwrap_err();
        assert!(matches!(err, StreamError::Protocol { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn empty_content_is_filtered() {
        let payload = r#"{"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(parse_delta(payload).unwrap(), None);
    }
}
