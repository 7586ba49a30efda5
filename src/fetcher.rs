//! Response fetcher policies.
//!
//! A [`ResponseFetcher`] decides which data sources a call consults and in
//! what order. It is a pure value; the call executes the plan.

/// A data source a call can consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchSource {
    /// The normalized cache.
    Cache,
    /// The server, through the transport.
    Network,
}

/// How a call walks its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchPlan {
    /// Consult one source and deliver what it yields. A cache miss is
    /// delivered as a response without data.
    Single(FetchSource),
    /// Consult `primary`; consult `fallback` only when `primary` misses or
    /// fails. A network failure wins over a cache failure.
    Fallback {
        /// Consulted first.
        primary: FetchSource,
        /// Consulted when `primary` yields nothing.
        fallback: FetchSource,
    },
    /// Read the cache and fetch from the network concurrently, delivering
    /// the cache result first.
    Concurrent,
}

/// The policy selecting cache and network sources for a call.
///
/// # Examples
///
/// ```
/// use graphcall::{FetchPlan, FetchSource, ResponseFetcher};
///
/// assert_eq!(
///     ResponseFetcher::NetworkFirst.plan(),
///     FetchPlan::Fallback {
///         primary: FetchSource::Network,
///         fallback: FetchSource::Cache,
///     }
/// );
///
/// // Without a cache every policy behaves as network-only.
/// assert_eq!(
///     ResponseFetcher::CacheOnly.resolve(false),
///     ResponseFetcher::NetworkOnly
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResponseFetcher {
    /// Read the cache only; a miss yields a response with no data.
    CacheOnly,
    /// Fetch from the network only, writing the result through to the cache.
    NetworkOnly,
    /// Read the cache; on a miss, fetch from the network.
    #[default]
    CacheFirst,
    /// Fetch from the network; on any failure, fall back to the cache.
    NetworkFirst,
    /// Read the cache and fetch from the network concurrently, delivering
    /// the cache response first and the network response second.
    CacheAndNetwork,
}

impl ResponseFetcher {
    /// The policy actually applied, given whether a cache is configured.
    ///
    /// Policies that read the cache degrade to [`ResponseFetcher::NetworkOnly`]
    /// when none is.
    pub fn resolve(self, cache_available: bool) -> Self {
        if cache_available {
            self
        } else {
            ResponseFetcher::NetworkOnly
        }
    }

    /// The plan the call executes for this policy.
    pub fn plan(self) -> FetchPlan {
        match self {
            ResponseFetcher::CacheOnly => FetchPlan::Single(FetchSource::Cache),
            ResponseFetcher::NetworkOnly => FetchPlan::Single(FetchSource::Network),
            ResponseFetcher::CacheFirst => FetchPlan::Fallback {
                primary: FetchSource::Cache,
                fallback: FetchSource::Network,
            },
            ResponseFetcher::NetworkFirst => FetchPlan::Fallback {
                primary: FetchSource::Network,
                fallback: FetchSource::Cache,
            },
            ResponseFetcher::CacheAndNetwork => FetchPlan::Concurrent,
        }
    }
}
