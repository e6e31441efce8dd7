//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chronoweave_api::build_router;
use chronoweave_api::state::{AppState, RunLimits};
use chronoweave_core::clock::Clock;
use chronoweave_core::generator::NarrativeGenerator;
use chronoweave_core::rng::DeterministicRng;
use chronoweave_simulation::application::engine::{EngineSettings, RetryPolicy};
use chronoweave_test_support::{FixedClock, MockRng};
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Upper bound on any single wait in these tests.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Build the full app router around `generator` with a deterministic
/// clock and RNG and millisecond-scale engine waits. Uses the same route
/// structure as `main.rs`.
pub fn build_test_app(generator: Arc<dyn NarrativeGenerator>) -> (Router, AppState) {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(FixedClock::standard());
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> = Arc::new(Mutex::new(MockRng));
    let settings = EngineSettings {
        pause_poll_interval: Duration::from_millis(5),
        retry: RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(2),
            max_backoff: Duration::from_millis(8),
        },
        ..EngineSettings::default()
    };
    let state = AppState::new(
        generator,
        clock,
        rng,
        settings,
        RunLimits {
            stream_buffer: 64,
            run_history_limit: 10,
        },
    );

    (build_router(state.clone()), state)
}

/// A start-run body for `ids` over `start..=end` in `mode`.
pub fn start_body(start: i32, end: i32, mode: &str, ids: &[&str]) -> serde_json::Value {
    let characters: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| serde_json::json!({ "id": id, "name": id.to_uppercase() }))
        .collect();
    serde_json::json!({
        "config": { "startYear": start, "endYear": end, "batchMode": mode },
        "characters": characters,
        "world": { "name": "Vell" }
    })
}

fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(json_request("POST", uri, body)).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// One parsed server-sent event.
#[derive(Debug, Clone)]
pub struct SseFrame {
    /// The `event:` line.
    pub event: String,
    /// The `data:` payload, parsed.
    pub data: serde_json::Value,
}

/// Reads server-sent events off a streaming response body.
pub struct SseReader {
    body: Body,
    buffer: String,
}

impl SseReader {
    /// POSTs `body` to the start-run endpoint and wraps the stream.
    pub async fn start(app: Router, body: &serde_json::Value) -> Self {
        let response = app
            .oneshot(json_request("POST", "/api/v1/simulations", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        Self {
            body: response.into_body(),
            buffer: String::new(),
        }
    }

    /// The next event, or `None` once the stream ends.
    pub async fn next(&mut self) -> Option<SseFrame> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                if let Some(frame) = parse_block(&block) {
                    return Some(frame);
                }
                continue;
            }
            let frame = tokio::time::timeout(PATIENCE, self.body.frame())
                .await
                .expect("timed out waiting for an SSE frame")?
                .unwrap();
            if let Ok(data) = frame.into_data() {
                self.buffer.push_str(std::str::from_utf8(&data).unwrap());
            }
        }
    }

    /// Events until one named `event`, that one included.
    pub async fn until(&mut self, event: &str) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        loop {
            let frame = self.next().await.expect("stream ended early");
            let done = frame.event == event;
            frames.push(frame);
            if done {
                return frames;
            }
        }
    }

    /// Every remaining event up to the end of the stream.
    pub async fn rest(mut self) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next().await {
            frames.push(frame);
        }
        frames
    }
}

/// Keep-alive comments carry no `data:` line and are skipped.
fn parse_block(block: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data = String::new();
    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_owned());
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push_str(value.trim_start());
        }
    }
    if data.is_empty() {
        return None;
    }
    Some(SseFrame {
        event: event.unwrap_or_else(|| "message".to_owned()),
        data: serde_json::from_str(&data).unwrap(),
    })
}

pub fn count(frames: &[SseFrame], event: &str) -> usize {
    frames.iter().filter(|f| f.event == event).count()
}
