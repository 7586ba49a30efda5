//! The callback contract through which calls deliver results.
//!
//! Only [`Callback::on_response`] and [`Callback::on_failure`] are required.
//! The specialized failure handlers default to the free functions in this
//! module, which route to `on_failure`.

use crate::error::{CanceledFailure, Error, HttpFailure, NetworkFailure, ParseFailure};
use crate::Response;

/// Advisory progress notifications for a call.
///
/// They never carry data. When emitted they follow the order
/// `Scheduled`, then `FetchCache`/`FetchNetwork`, then `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusEvent {
    /// The call was enqueued.
    Scheduled,
    /// The call started reading the cache.
    FetchCache,
    /// The call started a network fetch.
    FetchNetwork,
    /// The call completed without failure. No further events follow.
    Completed,
}

/// Receives the results of an [`OperationCall`](crate::OperationCall).
///
/// For one call, `on_response` runs at most twice (only under
/// [`ResponseFetcher::CacheAndNetwork`](crate::ResponseFetcher::CacheAndNetwork)),
/// never concurrently with itself. A failure is delivered at most once and is
/// always the last event.
///
/// # Examples
///
/// ```
/// use graphcall::{Callback, Error, Response};
///
/// struct PrintTitle;
///
/// impl Callback<serde_json::Value> for PrintTitle {
///     fn on_response(&self, response: Response<serde_json::Value>) {
///         println!("data: {:?} (from cache: {})", response.data, response.from_cache);
///     }
///
///     fn on_failure(&self, error: Error) {
///         eprintln!("failed: {error}");
///     }
/// }
/// ```
pub trait Callback<T>: Send + Sync + 'static {
    /// Receives a response.
    fn on_response(&self, response: Response<T>);

    /// Receives the terminal failure.
    fn on_failure(&self, error: Error);

    /// Receives a progress notification.
    fn on_status_event(&self, _event: StatusEvent) {}

    /// Receives an HTTP failure together with the raw transport response.
    ///
    /// The default passes the failure, raw response included, to
    /// [`Callback::on_failure`]. The response is released once the failure
    /// is dropped.
    fn on_http_error(&self, error: HttpFailure) {
        http_error(self, error);
    }

    /// Receives a network failure.
    fn on_network_error(&self, error: NetworkFailure) {
        self.on_failure(error.into());
    }

    /// Receives a parse failure.
    fn on_parse_error(&self, error: ParseFailure) {
        self.on_failure(error.into());
    }

    /// Receives a cancellation failure.
    fn on_canceled_error(&self, error: CanceledFailure) {
        self.on_failure(error.into());
    }
}

/// Default HTTP failure handling: the generic failure path, with the raw
/// transport response still attached.
pub fn http_error<T, C>(callback: &C, error: HttpFailure)
where
    C: Callback<T> + ?Sized,
{
    callback.on_failure(Error::Http(error));
}

/// Routes a failure to its specialized handler.
pub(crate) fn dispatch_failure<T: 'static>(callback: &dyn Callback<T>, error: Error) {
    match error {
        Error::Http(e) => callback.on_http_error(e),
        Error::Network(e) => callback.on_network_error(e),
        Error::Parse(e) => callback.on_parse_error(e),
        Error::Canceled(e) => callback.on_canceled_error(e),
        other => callback.on_failure(other),
    }
}
