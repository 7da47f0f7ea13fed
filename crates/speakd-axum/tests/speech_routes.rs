//! Integration tests for the speakd HTTP endpoints.
//!
//! These tests verify:
//!  - Every route is wired correctly (no 404/405).
//!  - The JSON shapes match the documented wire contract (camelCase
//!    fields, lowercase state labels).
//!  - The start/stop/status lifecycle behaves over HTTP: conflict on
//!    busy, 400 on blank input, idempotent stop, fresh session ids.
//!
//! The coordinator runs on mock collaborator ports — no network, no
//! ffmpeg, no audio hardware.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use speakd_axum::bootstrap::{AxumContext, CorsConfig};
use speakd_axum::routes::create_router;
use speakd_core::{
    AudioChunk, AudioChunkStream, AudioOutputPort, AudioPlayerPort, CoordinatorConfig,
    LanguageModelPort, OnBusyPolicy, PlayerError, RetryPolicy, SessionCoordinator,
    SpeechSynthesizerPort, StreamError, TextDeltaStream,
};

// ── Mock collaborators ─────────────────────────────────────────────

struct OneLinerLlm;

#[async_trait]
impl LanguageModelPort for OneLinerLlm {
    async fn stream_reply(&self, _prompt: &str) -> Result<TextDeltaStream, StreamError> {
        Ok(Box::pin(futures_util::stream::iter(vec![Ok("A reply. ".to_string())])))
    }
}

/// Emits a chunk every 5 ms for ~5 s so sessions stay running until
/// stopped.
struct PacedTts;

#[async_trait]
impl SpeechSynthesizerPort for PacedTts {
    async fn stream_speech(&self, _text: &str) -> Result<AudioChunkStream, StreamError> {
        Ok(Box::pin(async_stream::stream! {
            for seq in 0..1000u64 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                yield Ok(AudioChunk::new(seq, vec![0u8; 8]));
            }
        }))
    }
}

#[derive(Default)]
struct NullPlayer {
    closed: AtomicBool,
}

#[async_trait]
impl AudioPlayerPort for NullPlayer {
    async fn write(&self, _chunk: AudioChunk) -> Result<(), PlayerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PlayerError::Closed);
        }
        Ok(())
    }

    async fn finish(&self) -> Result<(), PlayerError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

struct NullOutput;

#[async_trait]
impl AudioOutputPort for NullOutput {
    async fn open(&self) -> Result<Arc<dyn AudioPlayerPort>, PlayerError> {
        Ok(Arc::new(NullPlayer::default()) as Arc<dyn AudioPlayerPort>)
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn test_router(on_busy: OnBusyPolicy) -> axum::Router {
    let coordinator = Arc::new(SessionCoordinator::new(
        Arc::new(OneLinerLlm),
        Arc::new(PacedTts),
        Arc::new(NullOutput),
        CoordinatorConfig {
            on_busy,
            stop_timeout: Duration::from_millis(500),
            retry: RetryPolicy { max_attempts: 2, base_delay: Duration::from_millis(1) },
        },
    ));
    create_router(AxumContext { coordinator }, &CorsConfig::AllowAll)
}

fn start_request(segments: &[&str]) -> Request<Body> {
    let body = serde_json::json!({ "textSegments": segments });
    Request::builder()
        .method("POST")
        .uri("/start")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn stop_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/stop")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn parse_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap_or_else(|e| panic!("Expected valid JSON body: {e}"))
}

// ── GET /health ────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_healthy() {
    let app = test_router(OnBusyPolicy::Reject);
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = parse_json(response).await;
    assert_eq!(json["status"], "healthy");
}

// ── POST /start ────────────────────────────────────────────────────

#[tokio::test]
async fn start_returns_session_one_in_an_accepted_state() {
    let app = test_router(OnBusyPolicy::Reject);

    let response = app.clone().oneshot(start_request(&["hello", "world"])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = parse_json(response).await;
    assert_eq!(json["status"], "started");
    assert_eq!(json["sessionId"], 1);
    let state = json["state"].as_str().unwrap();
    assert!(state == "starting" || state == "running", "unexpected state: {state}");

    // Status shortly after shows the same session.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let response = app.clone().oneshot(get_request("/status")).await.unwrap();
    let json = parse_json(response).await;
    assert_eq!(json["sessionId"], 1);
    assert_eq!(json["state"], "running");
    assert_eq!(json["stopRequested"], false);
    assert_eq!(json["hasWorker"], true);

    let _ = app.oneshot(stop_request()).await.unwrap();
}

#[tokio::test]
async fn start_with_blank_segments_is_a_400() {
    let app = test_router(OnBusyPolicy::Reject);

    let response = app.clone().oneshot(start_request(&[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(start_request(&["  ", ""])).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = parse_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("non-empty"));
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn start_while_running_conflicts_under_reject_policy() {
    let app = test_router(OnBusyPolicy::Reject);

    let response = app.clone().oneshot(start_request(&["first"])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(start_request(&["second"])).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Original session id is unchanged.
    let response = app.clone().oneshot(get_request("/status")).await.unwrap();
    let json = parse_json(response).await;
    assert_eq!(json["sessionId"], 1);

    let _ = app.oneshot(stop_request()).await.unwrap();
}

#[tokio::test]
async fn start_while_running_preempts_under_preempt_policy() {
    let app = test_router(OnBusyPolicy::Preempt);

    let response = app.clone().oneshot(start_request(&["first"])).await.unwrap();
    assert_eq!(parse_json(response).await["sessionId"], 1);

    let response = app.clone().oneshot(start_request(&["second"])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse_json(response).await["sessionId"], 2);

    let _ = app.oneshot(stop_request()).await.unwrap();
}

// ── POST /stop ─────────────────────────────────────────────────────

#[tokio::test]
async fn stop_after_start_reports_idle_with_no_player() {
    let app = test_router(OnBusyPolicy::Reject);

    let _ = app.clone().oneshot(start_request(&["hello"])).await.unwrap();

    let response = app.clone().oneshot(stop_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = parse_json(response).await;
    assert_eq!(json["status"], "stopped");
    assert_eq!(json["state"], "idle");
    assert_eq!(json["sessionId"], 1);

    let response = app.oneshot(get_request("/status")).await.unwrap();
    let json = parse_json(response).await;
    assert_eq!(json["state"], "idle");
    assert_eq!(json["hasPlayer"], false);
    assert_eq!(json["hasWorker"], false);
    assert!(json["sessionId"].is_null());
}

#[tokio::test]
async fn stop_without_a_session_is_a_200_noop() {
    let app = test_router(OnBusyPolicy::Reject);

    for _ in 0..2 {
        let response = app.clone().oneshot(stop_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = parse_json(response).await;
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["state"], "idle");
        assert!(json.get("sessionId").is_none() || json["sessionId"].is_null());
    }
}

// ── Fresh ids across restarts ──────────────────────────────────────

#[tokio::test]
async fn restart_allocates_the_next_session_id() {
    let app = test_router(OnBusyPolicy::Reject);

    let _ = app.clone().oneshot(start_request(&["one"])).await.unwrap();
    let _ = app.clone().oneshot(stop_request()).await.unwrap();

    let response = app.clone().oneshot(start_request(&["two"])).await.unwrap();
    let json = parse_json(response).await;
    assert_eq!(json["sessionId"], 2);

    let _ = app.oneshot(stop_request()).await.unwrap();
}

// ── Status shape ───────────────────────────────────────────────────

#[tokio::test]
async fn status_json_shape_matches_the_wire_contract() {
    let app = test_router(OnBusyPolicy::Reject);

    let response = app.oneshot(get_request("/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = parse_json(response).await;

    for field in &["state", "sessionId", "stopRequested", "hasPlayer", "hasWorker"] {
        assert!(json.get(field).is_some(), "status response missing field '{field}': {json}");
    }
    assert_eq!(json["state"], "idle");
}

// ── Unknown routes ─────────────────────────────────────────────────

#[tokio::test]
async fn unknown_route_is_404() {
    let app = test_router(OnBusyPolicy::Reject);
    let response = app.oneshot(get_request("/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
