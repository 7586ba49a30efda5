//! Shared fakes and fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use graphcall::{
    CacheHeaders, Callback, Client, Error, HttpFailure, MemoryCache, NormalizedCache, Operation,
    OperationKind, Response, StatusEvent, Transport, TransportError, TransportRequest,
    TransportResponse,
};
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PostData {
    pub post: Option<Post>,
}

impl PostData {
    pub fn title(&self) -> Option<&str> {
        self.post.as_ref().map(|post| post.title.as_str())
    }
}

pub struct GetPost {
    pub id: String,
}

impl GetPost {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl Operation for GetPost {
    type Data = PostData;

    const KIND: OperationKind = OperationKind::Query;
    const NAME: &'static str = "GetPost";
    const DOCUMENT: &'static str = "query GetPost($id: ID!) { post(id: $id) { id title } }";

    fn variables(&self) -> Value {
        json!({ "id": self.id })
    }

    fn operation_id(&self) -> String {
        "4f1c2d".to_string()
    }
}

pub struct AddPost {
    pub title: String,
}

impl Operation for AddPost {
    type Data = PostData;

    const KIND: OperationKind = OperationKind::Mutation;
    const NAME: &'static str = "AddPost";
    const DOCUMENT: &'static str = "mutation AddPost($title: String!) { post: addPost(title: $title) { id title } }";

    fn variables(&self) -> Value {
        json!({ "title": self.title })
    }
}

pub fn post_record(id: &str, title: &str) -> Value {
    json!({ "post": { "id": id, "title": title } })
}

pub fn post_body(id: &str, title: &str) -> Value {
    json!({ "data": post_record(id, title) })
}

/// Everything a callback observed, in order.
#[derive(Debug)]
pub enum Event {
    Response(Response<PostData>),
    Status(StatusEvent),
    HttpError { status: u16, raw_body: Option<String> },
    Failure(Error),
}

impl Event {
    fn is_terminal(&self) -> bool {
        matches!(self, Event::Failure(_) | Event::Status(StatusEvent::Completed))
    }
}

pub struct RecordingCallback {
    tx: UnboundedSender<Event>,
}

impl Callback<PostData> for RecordingCallback {
    fn on_response(&self, response: Response<PostData>) {
        let _ = self.tx.send(Event::Response(response));
    }

    fn on_failure(&self, error: Error) {
        let _ = self.tx.send(Event::Failure(error));
    }

    fn on_status_event(&self, event: StatusEvent) {
        let _ = self.tx.send(Event::Status(event));
    }

    fn on_http_error(&self, error: HttpFailure) {
        let _ = self.tx.send(Event::HttpError {
            status: error.status().as_u16(),
            raw_body: error.raw_response().map(|raw| raw.body.clone()),
        });
        graphcall::callback::http_error::<PostData, _>(self, error);
    }
}

pub struct EventLog {
    rx: UnboundedReceiver<Event>,
}

impl EventLog {
    /// Collects events up to and including the terminal one.
    pub async fn until_terminal(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = self.rx.recv().await {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    break;
                }
            }
        })
        .await
        .expect("call did not terminate");
        events
    }

    /// Collects whatever arrives within `window`.
    pub async fn quiet_for(&mut self, window: Duration) -> Vec<Event> {
        let mut events = Vec::new();
        let _ = tokio::time::timeout(window, async {
            while let Some(event) = self.rx.recv().await {
                events.push(event);
            }
        })
        .await;
        events
    }
}

pub fn recorder() -> (RecordingCallback, EventLog) {
    let (tx, rx) = unbounded_channel();
    (RecordingCallback { tx }, EventLog { rx })
}

pub fn responses(events: &[Event]) -> Vec<&Response<PostData>> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Response(response) => Some(response),
            _ => None,
        })
        .collect()
}

pub fn failure(events: &[Event]) -> Option<&Error> {
    events.iter().find_map(|event| match event {
        Event::Failure(error) => Some(error),
        _ => None,
    })
}

pub fn statuses(events: &[Event]) -> Vec<StatusEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Status(status) => Some(*status),
            _ => None,
        })
        .collect()
}

type Handler =
    Box<dyn Fn(usize, &TransportRequest) -> Result<TransportResponse, TransportError> + Send + Sync>;

/// A transport answering from a closure, with optional latency and gating.
pub struct FakeTransport {
    handler: Handler,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    sends: AtomicUsize,
    bodies: Mutex<Vec<Value>>,
}

impl FakeTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(usize, &TransportRequest) -> Result<TransportResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: Duration::ZERO,
            gate: None,
            sends: AtomicUsize::new(0),
            bodies: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(move |_, _| Ok(json_response(StatusCode::OK, &body)))
    }

    pub fn status(status: StatusCode, body: &'static str) -> Self {
        Self::new(move |_, _| {
            Ok(TransportResponse {
                status,
                headers: HeaderMap::new(),
                body: body.to_string(),
            })
        })
    }

    pub fn unreachable() -> Self {
        Self::new(|_, _| Err(TransportError::Other("connection refused".to_string())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every send waits for a permit on `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().clone()
    }
}

pub fn json_response(status: StatusCode, body: &Value) -> TransportResponse {
    TransportResponse {
        status,
        headers: HeaderMap::new(),
        body: body.to_string(),
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let attempt = self.sends.fetch_add(1, Ordering::SeqCst);
        self.bodies.lock().push(request.body.clone());
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| TransportError::Other(e.to_string()))?
                .forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.handler)(attempt, &request)
    }
}

/// A memory cache with read latency.
#[derive(Default)]
pub struct SlowCache {
    pub inner: MemoryCache,
    pub delay: Duration,
}

#[async_trait]
impl NormalizedCache for SlowCache {
    async fn read(&self, key: &str, headers: &CacheHeaders) -> graphcall::Result<Option<Value>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.read(key, headers).await
    }

    async fn write(&self, key: &str, record: &Value, headers: &CacheHeaders) -> graphcall::Result<()> {
        self.inner.write(key, record, headers).await
    }

    async fn clear(&self) -> graphcall::Result<()> {
        self.inner.clear().await
    }
}

pub async fn seed(cache: &dyn NormalizedCache, id: &str, title: &str) {
    cache
        .write(
            &GetPost::new(id).cache_key(),
            &post_record(id, title),
            &CacheHeaders::new(),
        )
        .await
        .unwrap();
}

pub fn client(transport: Arc<FakeTransport>, cache: Option<Arc<dyn NormalizedCache>>) -> Client {
    let mut builder = Client::builder()
        .server_url("http://localhost:4000/graphql")
        .unwrap()
        .transport(transport);
    if let Some(cache) = cache {
        builder = builder.normalized_cache(cache);
    }
    builder.build().unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("graphcall=debug")
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}
