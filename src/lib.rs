//! # Graphcall - GraphQL operation calls over a cache and the network
//!
//! Graphcall executes GraphQL queries, mutations and subscriptions against a
//! remote service while arbitrating between a normalized cache and the
//! network according to a per-call [`ResponseFetcher`] policy. Results reach
//! application code through a [`Callback`] whose contract is the same whether
//! a call produces zero, one or two responses.
//!
//! ## Quick Start
//!
//! ```no_run
//! use graphcall::{Callback, Client, Error, MemoryCache, Operation, OperationKind, Response, ResponseFetcher};
//! use serde::Deserialize;
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Deserialize)]
//! struct PostData {
//!     post: Option<Post>,
//! }
//!
//! #[derive(Debug, Deserialize)]
//! struct Post {
//!     id: String,
//!     title: String,
//! }
//!
//! struct GetPost {
//!     id: String,
//! }
//!
//! impl Operation for GetPost {
//!     type Data = PostData;
//!
//!     const KIND: OperationKind = OperationKind::Query;
//!     const NAME: &'static str = "GetPost";
//!     const DOCUMENT: &'static str = "query GetPost($id: ID!) { post(id: $id) { id title } }";
//!
//!     fn variables(&self) -> Value {
//!         json!({ "id": self.id })
//!     }
//! }
//!
//! struct PrintPost;
//!
//! impl Callback<PostData> for PrintPost {
//!     fn on_response(&self, response: Response<PostData>) {
//!         println!("{:?} (from cache: {})", response.data, response.from_cache);
//!     }
//!
//!     fn on_failure(&self, error: Error) {
//!         eprintln!("call failed: {error}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let client = Client::builder()
//!         .server_url("https://api.example.com/graphql")?
//!         .normalized_cache(Arc::new(MemoryCache::new()))
//!         .build()?;
//!
//!     // Cache response first, network response second.
//!     client
//!         .query(GetPost { id: "p1".to_string() })
//!         .response_fetcher(ResponseFetcher::CacheAndNetwork)?
//!         .enqueue(PrintPost)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Fetch policies
//!
//! - [`ResponseFetcher::CacheOnly`] never touches the network; a miss yields
//!   a response without data.
//! - [`ResponseFetcher::NetworkOnly`] never reads the cache but writes the
//!   result through to it.
//! - [`ResponseFetcher::CacheFirst`] falls through to the network on a miss.
//! - [`ResponseFetcher::NetworkFirst`] falls back to the cache on any failure.
//! - [`ResponseFetcher::CacheAndNetwork`] delivers the cache response, even a
//!   miss, before the network response.
//!
//! Without a normalized cache every policy silently runs network-only.
//!
//! ## Error Handling
//!
//! Failures are recovered at the call boundary and delivered through the
//! callback, routed to [`Callback::on_http_error`], [`Callback::on_network_error`],
//! [`Callback::on_parse_error`] or [`Callback::on_canceled_error`], all of
//! which default to [`Callback::on_failure`]. Only configuration errors from
//! the builder and illegal-state errors from reusing a call are returned
//! synchronously.

pub mod cache;
mod call;
pub mod callback;
mod client;
mod error;
pub mod fetcher;
pub mod interceptor;
pub mod operation;
mod response;
pub mod retry;
pub mod subscription;
pub mod tracker;
pub mod transport;

pub use cache::{CacheHeaders, MemoryCache, NormalizedCache};
pub use call::{CallState, OperationCall};
pub use callback::{Callback, StatusEvent};
pub use client::{Client, ClientBuilder};
pub use error::{
    CanceledFailure, Error, HttpFailure, NetworkFailure, ParseFailure, RawResponse, Result,
};
pub use fetcher::{FetchPlan, FetchSource, ResponseFetcher};
pub use interceptor::{Chain, Interceptor, InterceptorRequest, InterceptorResponse};
pub use operation::{Operation, OperationKind, OperationRequest};
pub use response::{ErrorLocation, GraphqlError, Response, ResponseBody};
pub use retry::{RetryPredicate, RetryStrategy};
pub use subscription::{SubscriptionCall, SubscriptionCallback, SubscriptionChannel};
pub use tracker::{CallTracker, IdleCallback};
pub use transport::{
    ReqwestTransport, Transport, TransportError, TransportRequest, TransportResponse,
};
