//! `NarrativeGenerator` backed by a hosted HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use chronoweave_core::cancel::CancellationSignal;
use chronoweave_core::error::DomainError;
use chronoweave_core::generator::{
    GenerationOutput, GenerationRequest, GeneratorError, NarrativeGenerator,
};
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

/// Upper bound on establishing a connection, independent of the call timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest rejection message kept from an error response body.
const MAX_MESSAGE_CHARS: usize = 512;

/// Connection settings for [`HttpNarrativeGenerator`].
#[derive(Debug, Clone)]
pub struct HttpGeneratorConfig {
    /// Absolute URL the requests are posted to.
    pub endpoint: String,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    /// Per-call timeout covering connect, send, and body read.
    pub timeout: Duration,
}

/// Posts generation requests as JSON and decodes the JSON answer.
///
/// Status mapping: 2xx bodies are decoded (decode failure is `Malformed`);
/// 408, 429, and 5xx are `Transport`; any other status is `Rejected`.
#[derive(Debug, Clone)]
pub struct HttpNarrativeGenerator {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpNarrativeGenerator {
    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the endpoint is not an absolute
    /// URL, or `DomainError::Infrastructure` if the HTTP client cannot be
    /// constructed.
    pub fn new(config: HttpGeneratorConfig) -> Result<Self, DomainError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            DomainError::Validation(format!(
                "invalid generator endpoint {:?}: {e}",
                config.endpoint
            ))
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(config.timeout))
            .build()
            .map_err(|e| DomainError::Infrastructure(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    /// The URL requests are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call(&self, request: &GenerationRequest) -> Result<GenerationOutput, GeneratorError> {
        let mut builder = self.client.post(self.endpoint.clone()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }

        let body = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(|e| GeneratorError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl NarrativeGenerator for HttpNarrativeGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationSignal,
    ) -> Result<GenerationOutput, GeneratorError> {
        if cancel.is_cancelled() {
            return Err(GeneratorError::Cancelled);
        }
        debug!(
            run_id = %request.run_id,
            point = %request.point,
            attempt = request.attempt,
            characters = request.characters.len(),
            "calling narrative generator"
        );

        // Dropping the in-flight request future aborts the connection.
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(GeneratorError::Cancelled),
            result = self.call(request) => {
                if let Err(err) = &result {
                    warn!(%err, attempt = request.attempt, "narrative generator call failed");
                }
                result
            }
        }
    }
}

fn transport(err: reqwest::Error) -> GeneratorError {
    if err.is_timeout() {
        GeneratorError::Transport(format!("timed out: {err}"))
    } else {
        GeneratorError::Transport(err.to_string())
    }
}

fn classify(status: StatusCode, body: &str) -> GeneratorError {
    let message = rejection_message(body);
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        GeneratorError::Transport(format!("status {}: {message}", status.as_u16()))
    } else {
        GeneratorError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

/// Pulls a readable message out of an error body: `message`, then `error`
/// (string or `{message}`), then the raw text.
fn rejection_message(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(serde_json::Value::as_str)
                .or_else(|| value.get("error").and_then(serde_json::Value::as_str))
                .or_else(|| {
                    value
                        .get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(serde_json::Value::as_str)
                })
                .map(str::to_owned)
        });

    let message = from_json.unwrap_or_else(|| body.trim().to_owned());
    if message.is_empty() {
        return "no response body".to_owned();
    }
    message.chars().take(MAX_MESSAGE_CHARS).collect()
}
