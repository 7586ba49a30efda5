//! Client configuration and the factory for operation calls.
//!
//! The [`Client`] type holds process-wide defaults and stamps out calls that
//! inherit them. Use [`ClientBuilder`] to configure and create clients.

use http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use url::Url;

use crate::cache::{CacheHeaders, NormalizedCache};
use crate::call::OperationCall;
use crate::fetcher::ResponseFetcher;
use crate::interceptor::{Interceptor, Terminal};
use crate::operation::Operation;
use crate::retry::{RetryPredicate, RetryStrategy};
use crate::subscription::{SubscriptionCall, SubscriptionChannel};
use crate::tracker::CallTracker;
use crate::transport::{ReqwestTransport, Transport};
use crate::{Error, Result};

/// A GraphQL client that arbitrates between a normalized cache and the network.
///
/// The client is cheap to clone and designed to be shared. Every call it
/// creates is registered with the client's [`CallTracker`] while it runs.
///
/// # Examples
///
/// ```no_run
/// use graphcall::{Client, MemoryCache, ResponseFetcher};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), graphcall::Error> {
/// let client = Client::builder()
///     .server_url("https://api.example.com/graphql")?
///     .normalized_cache(Arc::new(MemoryCache::new()))
///     .default_response_fetcher(ResponseFetcher::CacheFirst)
///     .timeout(Duration::from_secs(30))
///     .build()?;
///
/// client.idle_callback(|| println!("all calls finished"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) tracker: CallTracker,
}

/// The validated configuration produced by [`ClientBuilder::build`].
pub(crate) struct ClientConfig {
    pub(crate) terminal: Terminal,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) default_fetcher: ResponseFetcher,
    pub(crate) default_cache_headers: CacheHeaders,
    pub(crate) subscription_channel: Option<Arc<dyn SubscriptionChannel>>,
    pub(crate) runtime: Handle,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a call for any operation with the client's defaults.
    ///
    /// Mutations always run network-only; queries use the default
    /// response fetcher.
    pub fn new_call<O: Operation>(&self, operation: O) -> OperationCall<O> {
        OperationCall::new(
            operation,
            Arc::clone(&self.inner),
            self.inner.config.default_fetcher,
        )
    }

    /// Creates a query call.
    pub fn query<O: Operation>(&self, query: O) -> OperationCall<O> {
        self.new_call(query)
    }

    /// Creates a mutation call. Mutations always go to the network.
    pub fn mutate<O: Operation>(&self, mutation: O) -> OperationCall<O> {
        OperationCall::new(mutation, Arc::clone(&self.inner), ResponseFetcher::NetworkOnly)
    }

    /// Creates a call that fetches from the network so the result is
    /// written to the normalized cache ahead of time.
    pub fn prefetch<O: Operation>(&self, operation: O) -> OperationCall<O> {
        OperationCall::new(operation, Arc::clone(&self.inner), ResponseFetcher::NetworkOnly)
    }

    /// Creates a subscription call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no subscription channel was configured.
    pub fn subscribe<O: Operation>(&self, subscription: O) -> Result<SubscriptionCall<O>> {
        let channel = self.inner.config.subscription_channel.clone().ok_or_else(|| {
            Error::Configuration("No subscription channel configured".to_string())
        })?;
        Ok(SubscriptionCall::new(subscription, channel))
    }

    /// Number of calls currently executing.
    pub fn active_calls_count(&self) -> usize {
        self.inner.tracker.active_calls_count()
    }

    /// Sets the observer invoked each time the client becomes idle.
    pub fn idle_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.tracker.set_idle_callback(Some(Arc::new(callback)));
    }

    /// Removes the idle observer.
    pub fn clear_idle_callback(&self) {
        self.inner.tracker.set_idle_callback(None);
    }

    /// The tracker of this client's in-flight calls.
    pub fn tracker(&self) -> &CallTracker {
        &self.inner.tracker
    }

    /// The cache headers applied to new calls.
    pub fn default_cache_headers(&self) -> &CacheHeaders {
        &self.inner.config.default_cache_headers
    }

    /// The server endpoint.
    pub fn server_url(&self) -> &Url {
        &self.inner.config.terminal.server_url
    }

    /// Removes every record from the normalized cache, if one is configured.
    pub async fn clear_normalized_cache(&self) -> Result<()> {
        match &self.inner.config.terminal.cache {
            Some(cache) => cache.clear().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server_url", &self.server_url().as_str())
            .field("default_fetcher", &self.inner.config.default_fetcher)
            .field("tracker", &self.inner.tracker)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// HTTP options (`default_header`, `timeout`, `retry_strategy`,
/// `retry_predicate`) configure the built-in reqwest transport and are
/// ignored when a custom [`Transport`] is set.
///
/// # Examples
///
/// ```no_run
/// use graphcall::{ClientBuilder, RetryStrategy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), graphcall::Error> {
/// let client = ClientBuilder::new()
///     .server_url("https://api.example.com/graphql")?
///     .retry_strategy(RetryStrategy::Exponential {
///         base: Duration::from_millis(100),
///         cap: Duration::from_secs(10),
///         max_retries: 3,
///         jitter: true,
///     })
///     .default_header("User-Agent", "my-app/1.0")?
///     .send_operation_identifiers(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    server_url: Option<Url>,
    transport: Option<Arc<dyn Transport>>,
    cache: Option<Arc<dyn NormalizedCache>>,
    default_fetcher: ResponseFetcher,
    default_cache_headers: CacheHeaders,
    interceptors: Vec<Arc<dyn Interceptor>>,
    send_operation_identifiers: bool,
    subscription_channel: Option<Arc<dyn SubscriptionChannel>>,
    runtime: Option<Handle>,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    retry_strategy: RetryStrategy,
    retry_predicate: Option<Box<dyn RetryPredicate>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            server_url: None,
            transport: None,
            cache: None,
            default_fetcher: ResponseFetcher::default(),
            default_cache_headers: CacheHeaders::default(),
            interceptors: Vec::new(),
            send_operation_identifiers: false,
            subscription_channel: None,
            runtime: None,
            default_headers: HeaderMap::new(),
            timeout: None,
            retry_strategy: RetryStrategy::None,
            retry_predicate: None,
        }
    }

    /// Sets the GraphQL endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn server_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.server_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the transport. Defaults to a [`ReqwestTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the normalized cache. Without one, every policy runs network-only.
    pub fn normalized_cache(mut self, cache: Arc<dyn NormalizedCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the response fetcher used by calls that do not override it.
    pub fn default_response_fetcher(mut self, fetcher: ResponseFetcher) -> Self {
        self.default_fetcher = fetcher;
        self
    }

    /// Sets the cache headers used by calls that do not override them.
    pub fn default_cache_headers(mut self, headers: CacheHeaders) -> Self {
        self.default_cache_headers = headers;
        self
    }

    /// Appends an application interceptor. Interceptors run in the order
    /// they were added.
    pub fn add_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Sends operation identifiers instead of full documents.
    pub fn send_operation_identifiers(mut self, enabled: bool) -> Self {
        self.send_operation_identifiers = enabled;
        self
    }

    /// Sets the channel used by subscription calls.
    pub fn subscription_channel(mut self, channel: Arc<dyn SubscriptionChannel>) -> Self {
        self.subscription_channel = Some(channel);
        self
    }

    /// Sets the Tokio runtime calls are spawned on.
    ///
    /// Defaults to the runtime `build` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Adds a header sent with every HTTP request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the HTTP request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry strategy for failed HTTP requests.
    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    /// Sets a custom retry predicate.
    pub fn retry_predicate(mut self, predicate: Box<dyn RetryPredicate>) -> Self {
        self.retry_predicate = Some(predicate);
        self
    }

    /// Validates the configuration and builds the `Client`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no server URL was provided, if no
    /// Tokio runtime is available, or if the HTTP client cannot be built.
    pub fn build(self) -> Result<Client> {
        let config = self.resolve()?;
        Ok(Client {
            inner: Arc::new(ClientInner {
                config,
                tracker: CallTracker::new(),
            }),
        })
    }

    fn resolve(self) -> Result<ClientConfig> {
        let server_url = self
            .server_url
            .ok_or_else(|| Error::Configuration("Server URL is required".to_string()))?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| {
                Error::Configuration(format!("No Tokio runtime available: {}", e))
            })?,
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let http_client = reqwest::Client::builder().build().map_err(|e| {
                    Error::Configuration(format!("Failed to build HTTP client: {}", e))
                })?;
                Arc::new(
                    ReqwestTransport::new(http_client)
                        .with_default_headers(self.default_headers)
                        .with_timeout(self.timeout)
                        .with_retry(self.retry_strategy, self.retry_predicate),
                )
            }
        };

        Ok(ClientConfig {
            terminal: Terminal {
                server_url,
                transport,
                cache: self.cache,
                send_operation_identifiers: self.send_operation_identifiers,
            },
            interceptors: self.interceptors,
            default_fetcher: self.default_fetcher,
            default_cache_headers: self.default_cache_headers,
            subscription_channel: self.subscription_channel,
            runtime,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_server_url_fails() {
        let result = Client::builder().build();
        assert!(matches!(result, Err(Error::Configuration(msg)) if msg.contains("Server URL")));
    }

    #[test]
    fn test_invalid_server_url_fails() {
        assert!(matches!(
            Client::builder().server_url("not a url"),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_missing_runtime_fails() {
        let result = Client::builder()
            .server_url("http://localhost/graphql")
            .unwrap()
            .build();
        assert!(matches!(result, Err(Error::Configuration(msg)) if msg.contains("Tokio runtime")));
    }

    #[tokio::test]
    async fn test_builds_inside_runtime() {
        let client = Client::builder()
            .server_url("http://localhost/graphql")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(client.active_calls_count(), 0);
        assert_eq!(client.server_url().path(), "/graphql");
        assert!(client.default_cache_headers().is_empty());
    }
}
