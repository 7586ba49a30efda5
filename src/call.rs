//! The single-use call bound to one operation.
//!
//! An [`OperationCall`] moves through `Idle -> Executing -> {Completed | Canceled}`.
//! Every delivery to the callback goes through one gate that checks the state
//! first, so nothing reaches the callback after the call left `Executing`.

use futures::future::join_all;
use parking_lot::{Mutex, ReentrantMutex};
use serde::de::DeserializeOwned;
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheHeaders;
use crate::callback::{dispatch_failure, Callback, StatusEvent};
use crate::client::ClientInner;
use crate::error::{CanceledFailure, NetworkFailure, ParseFailure};
use crate::fetcher::{FetchPlan, FetchSource, ResponseFetcher};
use crate::interceptor::{Chain, InterceptorRequest, InterceptorResponse};
use crate::operation::{Operation, OperationKind, OperationRequest};
use crate::{Error, Response, Result};

/// The lifecycle state of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    /// Created, not yet enqueued.
    Idle,
    /// Enqueued and not yet terminated.
    Executing,
    /// The terminal event was delivered.
    Completed,
    /// Canceled before completion.
    Canceled,
}

/// A single-use execution of one operation.
///
/// Created by [`Client::new_call`](crate::Client::new_call) and friends with
/// the client's defaults. [`Clone`] yields a fresh, unexecuted call with the
/// same operation and configuration.
///
/// # Examples
///
/// ```no_run
/// # use graphcall::{Callback, Client, Error, Operation, OperationKind, Response, ResponseFetcher};
/// # struct Viewer;
/// # impl Operation for Viewer {
/// #     type Data = serde_json::Value;
/// #     const KIND: OperationKind = OperationKind::Query;
/// #     const NAME: &'static str = "Viewer";
/// #     const DOCUMENT: &'static str = "query Viewer { viewer { id } }";
/// # }
/// # struct Print;
/// # impl Callback<serde_json::Value> for Print {
/// #     fn on_response(&self, r: Response<serde_json::Value>) { println!("{:?}", r.data); }
/// #     fn on_failure(&self, e: Error) { eprintln!("{e}"); }
/// # }
/// # async fn example(client: Client) -> Result<(), Error> {
/// let call = client
///     .query(Viewer)
///     .response_fetcher(ResponseFetcher::CacheAndNetwork)?;
/// call.enqueue(Print)?;
///
/// // A finished call cannot run again, but its clone can.
/// let retry = call.clone();
/// # Ok(())
/// # }
/// ```
pub struct OperationCall<O: Operation> {
    operation: Arc<O>,
    request: Arc<OperationRequest>,
    client: Arc<ClientInner>,
    cache_headers: CacheHeaders,
    fetcher: ResponseFetcher,
    refetch: Vec<Arc<OperationRequest>>,
    lifecycle: Arc<Lifecycle<O::Data>>,
}

impl<O: Operation> OperationCall<O> {
    pub(crate) fn new(operation: O, client: Arc<ClientInner>, fetcher: ResponseFetcher) -> Self {
        let request = Arc::new(OperationRequest::of(&operation));
        let cache_headers = client.config.default_cache_headers.clone();
        let lifecycle = Arc::new(Lifecycle::new(Arc::clone(&client), O::KIND, O::NAME));
        Self {
            operation: Arc::new(operation),
            request,
            client,
            cache_headers,
            fetcher,
            refetch: Vec::new(),
            lifecycle,
        }
    }

    /// The operation this call executes.
    pub fn operation(&self) -> &O {
        &self.operation
    }

    /// The current lifecycle state.
    pub fn state(&self) -> CallState {
        self.lifecycle.slot.lock().state
    }

    /// Returns `true` if the call was canceled.
    pub fn is_canceled(&self) -> bool {
        self.state() == CallState::Canceled
    }

    /// Replaces the cache headers. Only legal before `enqueue`.
    pub fn cache_headers(mut self, headers: CacheHeaders) -> Result<Self> {
        self.ensure_idle()?;
        self.cache_headers = headers;
        Ok(self)
    }

    /// Replaces the response fetcher. Only legal before `enqueue`.
    pub fn response_fetcher(mut self, fetcher: ResponseFetcher) -> Result<Self> {
        self.ensure_idle()?;
        self.fetcher = fetcher;
        Ok(self)
    }

    /// Adds queries to re-fetch from the network once this mutation succeeds.
    ///
    /// The results go through the interceptor chain into the cache. Each
    /// refetch counts as an active call, and the mutation reports
    /// [`StatusEvent::Completed`] only after all of them finished. A failed
    /// refetch is logged and does not fail the mutation.
    ///
    /// Only legal before `enqueue`. Fails with [`Error::Configuration`] unless
    /// this call is a mutation and `Q` a query. Chain it to refetch queries
    /// of several types.
    pub fn refetch_queries<Q, I>(mut self, queries: I) -> Result<Self>
    where
        Q: Operation,
        I: IntoIterator<Item = Q>,
    {
        self.ensure_idle()?;
        if O::KIND != OperationKind::Mutation {
            return Err(Error::Configuration(format!(
                "{} is not a mutation, only mutations refetch queries",
                O::NAME
            )));
        }
        if Q::KIND != OperationKind::Query {
            return Err(Error::Configuration(format!(
                "{} is not a query and cannot be refetched",
                Q::NAME
            )));
        }
        self.refetch.extend(
            queries
                .into_iter()
                .map(|query| Arc::new(OperationRequest::of(&query))),
        );
        Ok(self)
    }

    /// Schedules the call on the client's runtime.
    ///
    /// Never blocks. Fails with [`Error::IllegalState`] if the call already
    /// ran. A call canceled before it was enqueued reports a single
    /// [`Callback::on_canceled_error`] instead of running.
    pub fn enqueue<C>(&self, callback: C) -> Result<()>
    where
        C: Callback<O::Data>,
    {
        let callback: Arc<dyn Callback<O::Data>> = Arc::new(callback);

        let canceled_before_enqueue = {
            let mut slot = self.lifecycle.slot.lock();
            let state = slot.state;
            match state {
                CallState::Idle => {
                    slot.state = CallState::Executing;
                    slot.callback = Some(Arc::clone(&callback));
                    slot.enqueued = true;
                    self.client.tracker.register(O::KIND, O::NAME);
                    false
                }
                CallState::Canceled if !slot.enqueued => {
                    slot.enqueued = true;
                    true
                }
                state => {
                    return Err(Error::IllegalState(format!(
                        "Already executed, call for {} is {:?}",
                        O::NAME,
                        state
                    )))
                }
            }
        };

        if canceled_before_enqueue {
            callback.on_canceled_error(CanceledFailure::new(O::NAME));
            return Ok(());
        }

        let fetcher = self.effective_fetcher();
        tracing::debug!(operation = %O::NAME, fetcher = ?fetcher, "Enqueued call");
        self.lifecycle.emit(StatusEvent::Scheduled);

        let execution = Arc::new(Execution {
            lifecycle: Arc::clone(&self.lifecycle),
            request: Arc::clone(&self.request),
            cache_headers: self.cache_headers.clone(),
            fetcher,
            refetch: self.refetch.clone(),
        });
        self.client.config.runtime.spawn(execution.run());
        Ok(())
    }

    /// Cancels the call.
    ///
    /// Idempotent. Once this returns, the callback receives no further
    /// events. Calling it after completion does nothing.
    pub fn cancel(&self) {
        self.lifecycle.cancel();
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.state() {
            CallState::Idle => Ok(()),
            state => Err(Error::IllegalState(format!(
                "Already executed, call for {} is {:?}",
                O::NAME,
                state
            ))),
        }
    }

    fn effective_fetcher(&self) -> ResponseFetcher {
        match O::KIND {
            OperationKind::Query => self
                .fetcher
                .resolve(self.client.config.terminal.cache.is_some()),
            OperationKind::Mutation | OperationKind::Subscription => ResponseFetcher::NetworkOnly,
        }
    }
}

impl<O: Operation> Clone for OperationCall<O> {
    fn clone(&self) -> Self {
        Self {
            operation: Arc::clone(&self.operation),
            request: Arc::clone(&self.request),
            client: Arc::clone(&self.client),
            cache_headers: self.cache_headers.clone(),
            fetcher: self.fetcher,
            refetch: self.refetch.clone(),
            lifecycle: Arc::new(Lifecycle::new(Arc::clone(&self.client), O::KIND, O::NAME)),
        }
    }
}

impl<O: Operation> fmt::Debug for OperationCall<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationCall")
            .field("operation", &O::NAME)
            .field("state", &self.state())
            .field("fetcher", &self.fetcher)
            .field("cache_headers", &self.cache_headers)
            .field(
                "refetch",
                &self.refetch.iter().map(|query| query.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

struct Slot<T> {
    state: CallState,
    callback: Option<Arc<dyn Callback<T>>>,
    enqueued: bool,
}

/// Shared between a call handle and its running execution.
struct Lifecycle<T> {
    client: Arc<ClientInner>,
    kind: OperationKind,
    name: &'static str,
    slot: Mutex<Slot<T>>,
    // Held while the callback runs so deliveries never interleave and
    // cancel() waits for an in-progress delivery. Reentrant so callbacks may
    // cancel their own call. The flag is set while the callback runs.
    delivery: ReentrantMutex<Cell<bool>>,
    // Set when a callback canceled the last active call; the idle observer
    // runs after that callback returns.
    idle_pending: AtomicBool,
    cancel: CancellationToken,
}

impl<T: 'static> Lifecycle<T> {
    fn new(client: Arc<ClientInner>, kind: OperationKind, name: &'static str) -> Self {
        Self {
            client,
            kind,
            name,
            slot: Mutex::new(Slot {
                state: CallState::Idle,
                callback: None,
                enqueued: false,
            }),
            delivery: ReentrantMutex::new(Cell::new(false)),
            idle_pending: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    fn active_callback(&self) -> Option<Arc<dyn Callback<T>>> {
        let slot = self.slot.lock();
        match slot.state {
            CallState::Executing => slot.callback.clone(),
            _ => None,
        }
    }

    /// Runs `f` against the callback if the call is still executing.
    fn with_callback(&self, f: impl FnOnce(&dyn Callback<T>)) -> bool {
        let in_callback = self.delivery.lock();
        let nested = in_callback.get();
        let delivered = match self.active_callback() {
            Some(callback) => {
                in_callback.set(true);
                f(callback.as_ref());
                in_callback.set(nested);
                true
            }
            None => false,
        };
        drop(in_callback);

        if !nested {
            self.flush_idle();
        }
        delivered
    }

    fn flush_idle(&self) {
        if self.idle_pending.swap(false, Ordering::AcqRel) {
            self.client.tracker.notify_idle();
        }
    }

    fn emit(&self, event: StatusEvent) {
        self.with_callback(|callback| callback.on_status_event(event));
    }

    fn deliver(&self, response: Response<T>) {
        if !self.with_callback(|callback| callback.on_response(response)) {
            tracing::debug!(operation = %self.name, "Dropping response of inactive call");
        }
    }

    fn finish(&self, outcome: Result<()>) {
        {
            let in_callback = self.delivery.lock();
            let callback = {
                let mut slot = self.slot.lock();
                if slot.state != CallState::Executing {
                    tracing::debug!(operation = %self.name, state = ?slot.state, "Call already terminated");
                    return;
                }
                slot.state = CallState::Completed;
                slot.callback.take()
            };

            if let Some(callback) = callback {
                in_callback.set(true);
                match outcome {
                    Ok(()) => callback.on_status_event(StatusEvent::Completed),
                    Err(e) => {
                        tracing::debug!(operation = %self.name, error = %e, "Call failed");
                        dispatch_failure(callback.as_ref(), e);
                    }
                }
                in_callback.set(false);
            }
        }

        self.client.tracker.unregister(self.kind, self.name);
    }

    fn cancel(&self) {
        let released = {
            let in_callback = self.delivery.lock();
            let mut slot = self.slot.lock();
            match slot.state {
                CallState::Idle => {
                    slot.state = CallState::Canceled;
                    return;
                }
                CallState::Executing => {
                    slot.state = CallState::Canceled;
                    slot.callback = None;
                    self.cancel.cancel();
                }
                CallState::Completed | CallState::Canceled => return,
            }
            drop(slot);
            tracing::debug!(operation = %self.name, "Canceled call");

            // Inside the callback the observer waits until it returned.
            if in_callback.get() {
                if self.client.tracker.release(self.kind, self.name) {
                    self.idle_pending.store(true, Ordering::Release);
                }
                true
            } else {
                false
            }
        };

        if !released {
            self.client.tracker.unregister(self.kind, self.name);
        }
    }
}

/// One run of a call: executes the fetcher plan and delivers the results.
struct Execution<T> {
    lifecycle: Arc<Lifecycle<T>>,
    request: Arc<OperationRequest>,
    cache_headers: CacheHeaders,
    fetcher: ResponseFetcher,
    refetch: Vec<Arc<OperationRequest>>,
}

impl<T> Execution<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn run(self: Arc<Self>) {
        let outcome = match self.fetcher.plan() {
            FetchPlan::Single(source) => self.single(source).await,
            FetchPlan::Fallback { primary, fallback } => {
                self.with_fallback(primary, fallback).await
            }
            FetchPlan::Concurrent => self.cache_and_network().await,
        };

        if outcome.is_ok() && !self.refetch.is_empty() && !self.lifecycle.cancel.is_cancelled() {
            self.refetch_queries().await;
        }
        self.lifecycle.finish(outcome);
    }

    async fn single(&self, source: FetchSource) -> Result<()> {
        let response = self.leg(source).await?;
        self.lifecycle
            .deliver(response.unwrap_or_else(Response::cache_miss));
        Ok(())
    }

    async fn with_fallback(&self, primary: FetchSource, fallback: FetchSource) -> Result<()> {
        let primary_error = match self.leg(primary).await {
            Ok(Some(response)) => {
                self.lifecycle.deliver(response);
                return Ok(());
            }
            Ok(None) => None,
            Err(e) if e.is_canceled() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    operation = %self.request.name,
                    source = ?primary,
                    fallback = ?fallback,
                    "Fetch failed, trying fallback"
                );
                Some(e)
            }
        };

        match self.leg(fallback).await {
            Ok(Some(response)) => {
                self.lifecycle.deliver(response);
                Ok(())
            }
            Ok(None) => match primary_error {
                Some(e) => Err(e),
                None => {
                    self.lifecycle.deliver(Response::cache_miss());
                    Ok(())
                }
            },
            Err(e) if e.is_canceled() || fallback == FetchSource::Network => Err(e),
            Err(e) => Err(primary_error.unwrap_or(e)),
        }
    }

    async fn cache_and_network(self: &Arc<Self>) -> Result<()> {
        let network = {
            let this = Arc::clone(self);
            self.lifecycle
                .client
                .config
                .runtime
                .spawn(async move { this.network_leg().await })
        };

        let cached = match self.cache_leg().await {
            Ok(cached) => cached.unwrap_or_else(Response::cache_miss),
            Err(e) if e.is_canceled() => {
                network.abort();
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, operation = %self.request.name, "Cache leg failed");
                Response::cache_miss()
            }
        };
        self.lifecycle.deliver(cached);

        let response = network
            .await
            .map_err(|e| NetworkFailure::new(format!("network fetch did not finish: {e}")))??;
        self.lifecycle.deliver(response);
        Ok(())
    }

    /// Consults one source. `Ok(None)` is a cache miss.
    async fn leg(&self, source: FetchSource) -> Result<Option<Response<T>>> {
        match source {
            FetchSource::Cache => self.cache_leg().await,
            FetchSource::Network => self.network_leg().await.map(Some),
        }
    }

    async fn cache_leg(&self) -> Result<Option<Response<T>>> {
        self.lifecycle.emit(StatusEvent::FetchCache);
        let response = self.proceed(true).await?;

        let Some(body) = response.body else {
            return Ok(None);
        };
        if body.data().is_none() {
            return Ok(None);
        }

        match Response::decode(&body, response.from_cache) {
            Ok(cached) => Ok(Some(cached)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    key = %self.request.cache_key,
                    "Cached record does not match the operation, treating as miss"
                );
                Ok(None)
            }
        }
    }

    async fn network_leg(&self) -> Result<Response<T>> {
        self.lifecycle.emit(StatusEvent::FetchNetwork);
        let response = self.proceed(false).await?;
        let body = response.body.unwrap_or_default();

        let data = match body.data().map(T::deserialize).transpose() {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    operation = %self.request.name,
                    "Response data does not match the operation"
                );
                return Err(ParseFailure {
                    raw_response: body.data().map(ToString::to_string).unwrap_or_default(),
                    serde_error: e.to_string(),
                    status: response.status,
                }
                .into());
            }
        };

        Ok(Response::new(data, body.errors, response.from_cache))
    }

    /// Re-runs the mutation's refetch queries on the network, concurrently.
    async fn refetch_queries(&self) {
        let tracker = &self.lifecycle.client.tracker;
        let refetches = self.refetch.iter().map(|query| async move {
            tracker.register(query.kind, query.name);
            tracing::debug!(query = %query.name, mutation = %self.request.name, "Refetching query");

            let request = InterceptorRequest {
                operation: Arc::clone(query),
                cache_headers: CacheHeaders::new(),
                fetch_from_cache: false,
            };
            if let Err(e) = self.chain().proceed(request).await {
                tracing::warn!(
                    error = %e,
                    query = %query.name,
                    mutation = %self.request.name,
                    "Refetch failed"
                );
            }
            tracker.unregister(query.kind, query.name);
        });
        join_all(refetches).await;
    }

    async fn proceed(&self, fetch_from_cache: bool) -> Result<InterceptorResponse> {
        let request = InterceptorRequest {
            operation: Arc::clone(&self.request),
            cache_headers: self.cache_headers.clone(),
            fetch_from_cache,
        };
        self.chain().proceed(request).await
    }

    fn chain(&self) -> Chain<'_> {
        let config = &self.lifecycle.client.config;
        Chain::new(&config.interceptors, &config.terminal, &self.lifecycle.cancel)
    }
}
