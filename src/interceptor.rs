//! The interceptor chain every call leg passes through.
//!
//! Application interceptors run in registration order. Each one either
//! delegates to the rest of the chain with [`Chain::proceed`] or
//! short-circuits by returning its own response or error, in which case the
//! interceptors after it never run. The chain ends at the built-in stage that
//! reads the normalized cache or talks to the transport, depending on
//! [`InterceptorRequest::fetch_from_cache`].

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::{CacheHeaders, NormalizedCache};
use crate::error::{CanceledFailure, HttpFailure, NetworkFailure, ParseFailure, RawResponse};
use crate::operation::OperationRequest;
use crate::response::ResponseBody;
use crate::transport::{Transport, TransportRequest};
use crate::Result;

/// The request flowing through the chain for one leg of a call.
#[derive(Debug, Clone)]
pub struct InterceptorRequest {
    /// The operation being executed.
    pub operation: Arc<OperationRequest>,
    /// The call's cache headers.
    pub cache_headers: CacheHeaders,
    /// `true` for the cache leg, `false` for the network leg.
    pub fetch_from_cache: bool,
}

/// The untyped result of one leg.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptorResponse {
    /// The response envelope. `None` signals a cache miss.
    pub body: Option<ResponseBody>,
    /// Whether the body was read from the cache.
    pub from_cache: bool,
    /// The HTTP status, when the body came from the network.
    pub status: Option<StatusCode>,
}

impl InterceptorResponse {
    /// A cache miss.
    pub fn cache_miss() -> Self {
        Self {
            body: None,
            from_cache: true,
            status: None,
        }
    }

    /// A body read from the cache.
    pub fn cached(body: ResponseBody) -> Self {
        Self {
            body: Some(body),
            from_cache: true,
            status: None,
        }
    }

    /// A body received from the network.
    pub fn network(body: ResponseBody, status: StatusCode) -> Self {
        Self {
            body: Some(body),
            from_cache: false,
            status: Some(status),
        }
    }
}

/// Middleware around every leg of every call made by a client.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use graphcall::interceptor::{Chain, Interceptor, InterceptorRequest, InterceptorResponse};
///
/// struct LogOperation;
///
/// #[async_trait]
/// impl Interceptor for LogOperation {
///     async fn intercept(
///         &self,
///         request: InterceptorRequest,
///         chain: Chain<'_>,
///     ) -> graphcall::Result<InterceptorResponse> {
///         tracing::info!(operation = %request.operation.name, "Intercepted");
///         chain.proceed(request).await
///     }
/// }
/// ```
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Handles the request, usually by delegating to `chain`.
    async fn intercept(
        &self,
        request: InterceptorRequest,
        chain: Chain<'_>,
    ) -> Result<InterceptorResponse>;
}

/// The remainder of the chain after the current interceptor.
pub struct Chain<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    terminal: &'a Terminal,
    cancel: &'a CancellationToken,
}

impl<'a> Chain<'a> {
    pub(crate) fn new(
        interceptors: &'a [Arc<dyn Interceptor>],
        terminal: &'a Terminal,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            interceptors,
            terminal,
            cancel,
        }
    }

    /// Returns `true` if the call this chain belongs to was canceled.
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Passes the request to the next stage.
    ///
    /// Fails with a cancellation error without running the next stage when
    /// the call was canceled.
    pub async fn proceed(self, request: InterceptorRequest) -> Result<InterceptorResponse> {
        if self.is_canceled() {
            return Err(CanceledFailure::new(request.operation.name).into());
        }

        match self.interceptors.split_first() {
            Some((next, rest)) => {
                let chain = Chain {
                    interceptors: rest,
                    ..self
                };
                next.intercept(request, chain).await
            }
            None => self.terminal.fetch(request, self.cancel).await,
        }
    }
}

/// The built-in last stage: reads the cache or sends over the transport.
pub(crate) struct Terminal {
    pub(crate) server_url: Url,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cache: Option<Arc<dyn NormalizedCache>>,
    pub(crate) send_operation_identifiers: bool,
}

impl Terminal {
    async fn fetch(
        &self,
        request: InterceptorRequest,
        cancel: &CancellationToken,
    ) -> Result<InterceptorResponse> {
        if request.fetch_from_cache {
            Ok(self.read_cache(&request).await)
        } else {
            self.fetch_network(request, cancel).await
        }
    }

    async fn read_cache(&self, request: &InterceptorRequest) -> InterceptorResponse {
        let Some(cache) = &self.cache else {
            return InterceptorResponse::cache_miss();
        };

        let key = &request.operation.cache_key;
        match cache.read(key, &request.cache_headers).await {
            Ok(Some(record)) => {
                tracing::debug!(key = %key, "Cache hit");
                InterceptorResponse::cached(ResponseBody::with_data(record))
            }
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
                InterceptorResponse::cache_miss()
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache read failed, treating as miss");
                InterceptorResponse::cache_miss()
            }
        }
    }

    async fn fetch_network(
        &self,
        request: InterceptorRequest,
        cancel: &CancellationToken,
    ) -> Result<InterceptorResponse> {
        let operation = &request.operation;
        let transport_request = TransportRequest {
            url: self.server_url.clone(),
            operation_name: operation.name.to_string(),
            headers: HeaderMap::new(),
            body: operation.to_body(self.send_operation_identifiers),
        };

        let response = self
            .transport
            .send(transport_request)
            .await
            .map_err(NetworkFailure::from)?;

        if cancel.is_cancelled() {
            tracing::debug!(operation = %operation.name, "Dropping network response of canceled call");
            return Err(CanceledFailure::new(operation.name).into());
        }

        let status = response.status;
        if !status.is_success() {
            if status.is_client_error() {
                tracing::error!(
                    status = status.as_u16(),
                    operation = %operation.name,
                    "Client error (4xx)"
                );
            } else {
                tracing::warn!(
                    status = status.as_u16(),
                    operation = %operation.name,
                    "Server error"
                );
            }
            return Err(HttpFailure::new(RawResponse {
                status,
                headers: response.headers,
                body: response.body,
            })
            .into());
        }

        let body: ResponseBody = match serde_json::from_str(&response.body) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    raw_response = %response.body,
                    "Failed to parse response"
                );
                return Err(ParseFailure {
                    raw_response: response.body,
                    serde_error: e.to_string(),
                    status: Some(status),
                }
                .into());
            }
        };

        self.write_through(&request, &body);
        Ok(InterceptorResponse::network(body, status))
    }

    /// Stores the network data in the cache without waiting for the write.
    fn write_through(&self, request: &InterceptorRequest, body: &ResponseBody) {
        let (Some(cache), Some(data)) = (&self.cache, body.data()) else {
            return;
        };

        let cache = Arc::clone(cache);
        let key = request.operation.cache_key.clone();
        let headers = request.cache_headers.clone();
        let record = data.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.write(&key, &record, &headers).await {
                tracing::warn!(error = %e, key = %key, "Cache write failed");
            }
        });
    }
}
