//! Normalized cache capability and cache headers.
//!
//! The call engine never interprets [`CacheHeaders`]; it passes them through
//! to the [`NormalizedCache`] on every read and write.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::Result;

/// An ordered set of string directives attached to a call.
///
/// Setting a header that already exists replaces its value in place.
///
/// # Examples
///
/// ```
/// use graphcall::CacheHeaders;
///
/// let headers = CacheHeaders::new()
///     .with_header(CacheHeaders::DO_NOT_STORE, "true")
///     .with_header("x-tenant", "blue");
///
/// assert!(headers.has_header(CacheHeaders::DO_NOT_STORE));
/// assert_eq!(headers.header("x-tenant"), Some("blue"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheHeaders {
    headers: Vec<(String, String)>,
}

impl CacheHeaders {
    /// Records received with this header are not written to the cache.
    pub const DO_NOT_STORE: &'static str = "do-not-store";

    /// Creates an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of these headers with `name` set to `value`.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Returns the value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns `true` if the header is present.
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Iterates over the headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns `true` if no header is set.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// Storage for records keyed by a resolved cache key.
///
/// Implementations own their read/write atomicity; the call engine may read
/// and write concurrently from several calls without extra locking.
#[async_trait]
pub trait NormalizedCache: Send + Sync {
    /// Reads the record stored under `key`, or `None` on a miss.
    async fn read(&self, key: &str, headers: &CacheHeaders) -> Result<Option<Value>>;

    /// Stores `record` under `key`.
    async fn write(&self, key: &str, record: &Value, headers: &CacheHeaders) -> Result<()>;

    /// Removes every record.
    async fn clear(&self) -> Result<()>;
}

/// An in-memory [`NormalizedCache`].
///
/// Honors [`CacheHeaders::DO_NOT_STORE`] on writes.
#[derive(Debug, Default)]
pub struct MemoryCache {
    records: DashMap<String, Value>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl NormalizedCache for MemoryCache {
    async fn read(&self, key: &str, _headers: &CacheHeaders) -> Result<Option<Value>> {
        Ok(self.records.get(key).map(|record| record.value().clone()))
    }

    async fn write(&self, key: &str, record: &Value, headers: &CacheHeaders) -> Result<()> {
        if headers.has_header(CacheHeaders::DO_NOT_STORE) {
            tracing::debug!(key = %key, "Skipping cache write");
            return Ok(());
        }
        self.records.insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.records.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headers_replace_in_place() {
        let headers = CacheHeaders::new()
            .with_header("a", "1")
            .with_header("b", "2")
            .with_header("a", "3");

        let collected: Vec<_> = headers.iter().collect();
        assert_eq!(collected, vec![("a", "3"), ("b", "2")]);
    }

    #[tokio::test]
    async fn test_memory_cache_do_not_store() {
        let cache = MemoryCache::new();
        let skip = CacheHeaders::new().with_header(CacheHeaders::DO_NOT_STORE, "true");

        cache.write("k", &json!({ "id": 1 }), &skip).await.unwrap();
        assert!(cache.is_empty());

        cache
            .write("k", &json!({ "id": 1 }), &CacheHeaders::new())
            .await
            .unwrap();
        assert_eq!(
            cache.read("k", &CacheHeaders::new()).await.unwrap(),
            Some(json!({ "id": 1 }))
        );

        cache.clear().await.unwrap();
        assert_eq!(cache.read("k", &CacheHeaders::new()).await.unwrap(), None);
    }
}
