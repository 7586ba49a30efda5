//! Basic example running one query through every fetch policy.
//!
//! This example shows how to:
//! - Create a client with a normalized cache
//! - Enqueue calls with different response fetchers
//! - Receive responses and failures through a callback
//! - Wait for the client to become idle
//!
//! Run with: `cargo run --example basic_query`

use graphcall::{
    Callback, Client, Error, MemoryCache, Operation, OperationKind, Response, ResponseFetcher,
    StatusEvent,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Deserialize)]
struct CountryData {
    country: Option<Country>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Country {
    name: String,
    capital: Option<String>,
    emoji: String,
}

struct GetCountry {
    code: &'static str,
}

impl Operation for GetCountry {
    type Data = CountryData;

    const KIND: OperationKind = OperationKind::Query;
    const NAME: &'static str = "GetCountry";
    const DOCUMENT: &'static str =
        "query GetCountry($code: ID!) { country(code: $code) { name capital emoji } }";

    fn variables(&self) -> Value {
        json!({ "code": self.code })
    }
}

struct PrintCountry {
    label: &'static str,
}

impl Callback<CountryData> for PrintCountry {
    fn on_response(&self, response: Response<CountryData>) {
        let source = if response.from_cache { "cache" } else { "network" };
        match response.data.and_then(|data| data.country) {
            Some(country) => println!(
                "[{}] {} {} (capital: {}) from {}",
                self.label,
                country.emoji,
                country.name,
                country.capital.as_deref().unwrap_or("none"),
                source
            ),
            None => println!("[{}] no data from {}", self.label, source),
        }
    }

    fn on_failure(&self, error: Error) {
        eprintln!("[{}] failed: {}", self.label, error);
    }

    fn on_status_event(&self, event: StatusEvent) {
        tracing::debug!(label = self.label, event = ?event, "Status event");
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("graphcall=debug,basic_query=info")
        .init();

    let client = Client::builder()
        .server_url("https://countries.trevorblades.com/graphql")?
        .normalized_cache(Arc::new(MemoryCache::new()))
        .build()?;

    let idle = Arc::new(Notify::new());
    {
        let idle = Arc::clone(&idle);
        client.idle_callback(move || idle.notify_one());
    }

    println!("=== Cache only (empty cache) ===");
    client
        .query(GetCountry { code: "NO" })
        .response_fetcher(ResponseFetcher::CacheOnly)?
        .enqueue(PrintCountry { label: "cache-only" })?;
    idle.notified().await;

    println!("=== Network only (fills the cache) ===");
    client
        .query(GetCountry { code: "NO" })
        .response_fetcher(ResponseFetcher::NetworkOnly)?
        .enqueue(PrintCountry { label: "network-only" })?;
    idle.notified().await;

    println!("=== Cache and network ===");
    client
        .query(GetCountry { code: "NO" })
        .response_fetcher(ResponseFetcher::CacheAndNetwork)?
        .enqueue(PrintCountry { label: "cache-and-network" })?;
    idle.notified().await;

    println!("=== Canceled before enqueue ===");
    let call = client.query(GetCountry { code: "SE" });
    call.cancel();
    call.enqueue(PrintCountry { label: "canceled" })?;

    println!("Active calls: {}", client.active_calls_count());
    Ok(())
}
