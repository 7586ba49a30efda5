//! Transport capability and the default reqwest-based implementation.
//!
//! The call engine only needs "send request, get response-or-error". Non-2xx
//! responses are still responses here; the engine classifies them.

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;

use crate::retry::{Attempt, RetryPredicate, RetryStrategy, TransientFailures};

/// A GraphQL request ready to be sent over HTTP.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// The server endpoint.
    pub url: Url,
    /// The operation name, for logging.
    pub operation_name: String,
    /// Per-request headers.
    pub headers: HeaderMap,
    /// The JSON body.
    pub body: Value,
}

/// The response returned by a [`Transport`].
#[derive(Debug)]
pub struct TransportResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The raw response body.
    pub body: String,
}

/// A failure to complete an HTTP exchange.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The underlying reqwest request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The exchange did not finish in time.
    #[error("request timed out")]
    Timeout,

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if the exchange timed out.
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Request(e) => e.is_timeout(),
            TransportError::Timeout => true,
            TransportError::Other(_) => false,
        }
    }

    /// Returns `true` if no connection could be established.
    pub fn is_connect(&self) -> bool {
        matches!(self, TransportError::Request(e) if e.is_connect())
    }
}

/// Sends GraphQL requests to the server.
///
/// An implementation may issue several HTTP requests per call (redirects,
/// retries); the call engine only sees the final outcome.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and returns the response, whatever its status.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// A [`Transport`] backed by `reqwest`, with default headers, an optional
/// timeout and retries.
pub struct ReqwestTransport {
    http_client: reqwest::Client,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    retry_strategy: RetryStrategy,
    retry_predicate: Box<dyn RetryPredicate>,
}

impl ReqwestTransport {
    /// Creates a transport that sends through `http_client` without retries.
    pub fn new(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            default_headers: HeaderMap::new(),
            timeout: None,
            retry_strategy: RetryStrategy::None,
            retry_predicate: Box::new(TransientFailures),
        }
    }

    /// Sets headers included in every request.
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry strategy and the predicate deciding which attempts to retry.
    pub fn with_retry(
        mut self,
        strategy: RetryStrategy,
        predicate: Option<Box<dyn RetryPredicate>>,
    ) -> Self {
        self.retry_strategy = strategy;
        if let Some(predicate) = predicate {
            self.retry_predicate = predicate;
        }
        self
    }

    async fn send_once(
        &self,
        request: &TransportRequest,
        attempt: usize,
    ) -> Result<TransportResponse, TransportError> {
        tracing::debug!(
            operation = %request.operation_name,
            url = %request.url,
            attempt = attempt,
            "Executing HTTP request"
        );

        let mut builder = self.http_client.post(request.url.clone());

        for (name, value) in &self.default_headers {
            builder = builder.header(name, value);
        }

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.json(&request.body).send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let start_time = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = self.send_once(&request, attempt).await;
            let retry = match &result {
                Ok(response) if response.status.is_success() => false,
                Ok(response) => self
                    .retry_predicate
                    .should_retry(Attempt::Status(response.status), attempt),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt = attempt,
                        operation = %request.operation_name,
                        "Request failed"
                    );
                    self.retry_predicate.should_retry(Attempt::Failed(e), attempt)
                }
            };

            let delay = if retry {
                self.retry_strategy.backoff(attempt)
            } else {
                None
            };

            match delay {
                Some(delay) => {
                    tracing::info!(
                        delay_ms = delay.as_millis(),
                        attempt = attempt,
                        "Retrying request after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    if let Ok(response) = &result {
                        tracing::info!(
                            status = response.status.as_u16(),
                            latency_ms = start_time.elapsed().as_millis(),
                            attempts = attempt,
                            "Received HTTP response"
                        );
                    }
                    return result;
                }
            }
        }
    }
}
