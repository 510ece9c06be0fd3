use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;
use url::Url;

use crate::error::PipelineError;
use crate::report::ReportBatch;
use crate::transport::response::{classify_response, DeliveryOutcome};
use crate::transport::wire::encode_batch;

/// Default bound on a single delivery attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

/// Delivers report batches to the tracking service.
///
/// One attempt per call; the call returns an outcome instead of an error so the retry
/// policy sees every result. Implementations must bound how long a call can block.
pub trait ReportClient: Send {
    /// Where batches are sent, for logs.
    fn endpoint(&self) -> &str;

    /// Send the whole batch in a single request.
    fn deliver(&mut self, batch: &ReportBatch) -> DeliveryOutcome;
}

impl<C: ReportClient + ?Sized> ReportClient for Box<C> {
    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }

    fn deliver(&mut self, batch: &ReportBatch) -> DeliveryOutcome {
        (**self).deliver(batch)
    }
}

/// HTTP client for the camera report endpoint.
///
/// Holds one connection pool for its lifetime; pools are never shared between pipelines.
pub struct HttpReportClient {
    agent: ureq::Agent,
    endpoint: String,
    timeout: Duration,
}

impl HttpReportClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        validate_endpoint(endpoint)?;
        if timeout.is_zero() {
            return Err(anyhow!("delivery timeout must be > 0"));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("parkwatch/", env!("CARGO_PKG_VERSION")))
            .build();
        Ok(Self {
            agent,
            endpoint: endpoint.to_string(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn post(&self, body: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
            .send_bytes(body);

        match response {
            Ok(response) => read_body(response),
            Err(ureq::Error::Status(code, response)) => {
                let detail = read_body(response)
                    .ok()
                    .and_then(|body| error_message(&body))
                    .map(|message| format!(": {}", message))
                    .unwrap_or_default();
                Err(PipelineError::Transport(format!(
                    "HTTP {} from {}{}",
                    code, self.endpoint, detail
                )))
            }
            Err(ureq::Error::Transport(err)) => Err(PipelineError::Transport(err.to_string())),
        }
    }
}

impl ReportClient for HttpReportClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn deliver(&mut self, batch: &ReportBatch) -> DeliveryOutcome {
        let body = match encode_batch(batch) {
            Ok(body) => body,
            Err(err) => return DeliveryOutcome::Failure(err),
        };
        log::debug!(
            "posting {} reports ({} bytes) to {}",
            batch.len(),
            body.len(),
            self.endpoint
        );
        match self.post(&body) {
            Ok(response) => classify_response(&response),
            Err(err) => DeliveryOutcome::Failure(err),
        }
    }
}

/// Endpoints must be absolute http(s) URLs.
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    let url = Url::parse(endpoint).with_context(|| format!("invalid endpoint '{}'", endpoint))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(anyhow!(
                "unsupported endpoint scheme '{}'; expected http or https",
                other
            ))
        }
    }
    if url.host_str().is_none() {
        return Err(anyhow!("endpoint '{}' has no host", endpoint));
    }
    Ok(())
}

fn read_body(response: ureq::Response) -> Result<Vec<u8>, PipelineError> {
    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_end(&mut body)
        .map_err(|e| PipelineError::Transport(format!("failed to read response: {}", e)))?;
    Ok(body)
}

fn error_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("message")
        .and_then(|message| message.as_str())
        .map(str::to_string)
}
