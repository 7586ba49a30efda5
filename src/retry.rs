//! Backoff and retry decisions for [`ReqwestTransport`](crate::ReqwestTransport).
//!
//! Retrying is a transport concern. One network leg of a call may send the
//! request several times; the call itself only sees the last outcome.

use http::StatusCode;
use rand::Rng;
use std::time::Duration;

use crate::transport::TransportError;

/// How long to wait before each resend, and how many resends to allow.
///
/// Attempt numbers passed to [`RetryStrategy::backoff`] count the requests
/// already sent, so the first resend asks for `backoff(1)`.
///
/// # Examples
///
/// ```
/// use graphcall::RetryStrategy;
/// use std::time::Duration;
///
/// let doubling = RetryStrategy::Exponential {
///     base: Duration::from_millis(50),
///     cap: Duration::from_secs(2),
///     max_retries: 4,
///     jitter: false,
/// };
/// assert_eq!(doubling.backoff(3), Some(Duration::from_millis(200)));
///
/// let steady = RetryStrategy::Fixed {
///     delay: Duration::from_millis(250),
///     max_retries: 2,
/// };
/// assert_eq!(steady.backoff(3), None);
/// ```
#[derive(Debug, Clone, Default)]
pub enum RetryStrategy {
    /// Send once and give up.
    #[default]
    None,

    /// Double the wait after every attempt, starting at `base` and never
    /// exceeding `cap`. With `jitter` the wait is scaled by a random factor
    /// in `[0.5, 1.0]`.
    Exponential {
        /// Wait before the first resend.
        base: Duration,
        /// Upper bound for any single wait.
        cap: Duration,
        /// Resends allowed after the first request.
        max_retries: usize,
        /// Randomize each wait.
        jitter: bool,
    },

    /// Wait the same `delay` before every resend.
    Fixed {
        /// Wait before each resend.
        delay: Duration,
        /// Resends allowed after the first request.
        max_retries: usize,
    },

    /// Ask a function; `None` stops resending.
    Custom(fn(attempt: usize) -> Option<Duration>),
}

impl RetryStrategy {
    /// The wait before resending after `attempt` requests, or `None` when
    /// no resend is allowed.
    pub fn backoff(&self, attempt: usize) -> Option<Duration> {
        match *self {
            RetryStrategy::None => None,
            RetryStrategy::Fixed { delay, max_retries } => {
                (attempt <= max_retries).then_some(delay)
            }
            RetryStrategy::Exponential {
                base,
                cap,
                max_retries,
                jitter,
            } => {
                if attempt == 0 || attempt > max_retries {
                    return None;
                }
                let doublings = u32::try_from(attempt - 1).unwrap_or(u32::MAX);
                let wait = base
                    .saturating_mul(2u32.saturating_pow(doublings))
                    .min(cap);
                Some(if jitter {
                    wait.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
                } else {
                    wait
                })
            }
            RetryStrategy::Custom(next) => next(attempt),
        }
    }
}

/// What happened to one request.
#[derive(Debug, Clone, Copy)]
pub enum Attempt<'a> {
    /// No response arrived.
    Failed(&'a TransportError),
    /// The server answered with a non-2xx status.
    Status(StatusCode),
}

/// Decides whether an unsuccessful request is worth sending again.
///
/// Closures with the matching signature are predicates too.
///
/// # Examples
///
/// ```
/// use graphcall::retry::{Attempt, RetryPredicate};
///
/// let only_rate_limits = |attempt: Attempt<'_>, _sent: usize| {
///     matches!(attempt, Attempt::Status(status) if status.as_u16() == 429)
/// };
/// # fn assert_predicate(_: &dyn RetryPredicate) {}
/// # assert_predicate(&only_rate_limits);
/// ```
pub trait RetryPredicate: Send + Sync {
    /// `sent` is the number of requests made so far, starting at 1.
    fn should_retry(&self, attempt: Attempt<'_>, sent: usize) -> bool;
}

impl<F> RetryPredicate for F
where
    F: Fn(Attempt<'_>, usize) -> bool + Send + Sync,
{
    fn should_retry(&self, attempt: Attempt<'_>, sent: usize) -> bool {
        self(attempt, sent)
    }
}

/// Timeouts, refused connections, 5xx and 429. The transport default.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientFailures;

impl RetryPredicate for TransientFailures {
    fn should_retry(&self, attempt: Attempt<'_>, _sent: usize) -> bool {
        match attempt {
            Attempt::Failed(error) => error.is_timeout() || error.is_connect(),
            Attempt::Status(status) => {
                status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

/// 5xx responses only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerErrors;

impl RetryPredicate for ServerErrors {
    fn should_retry(&self, attempt: Attempt<'_>, _sent: usize) -> bool {
        matches!(attempt, Attempt::Status(status) if status.is_server_error())
    }
}

/// Timeouts only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeouts;

impl RetryPredicate for Timeouts {
    fn should_retry(&self, attempt: Attempt<'_>, _sent: usize) -> bool {
        matches!(attempt, Attempt::Failed(error) if error.is_timeout())
    }
}

/// Retries when at least one inner predicate does.
pub struct AnyOf(pub Vec<Box<dyn RetryPredicate>>);

impl RetryPredicate for AnyOf {
    fn should_retry(&self, attempt: Attempt<'_>, sent: usize) -> bool {
        self.0.iter().any(|inner| inner.should_retry(attempt, sent))
    }
}

/// Retries only when every inner predicate does.
pub struct AllOf(pub Vec<Box<dyn RetryPredicate>>);

impl RetryPredicate for AllOf {
    fn should_retry(&self, attempt: Attempt<'_>, sent: usize) -> bool {
        self.0.iter().all(|inner| inner.should_retry(attempt, sent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_doubles_up_to_cap() {
        let strategy = RetryStrategy::Exponential {
            base: Duration::from_millis(100),
            cap: Duration::from_millis(500),
            max_retries: 4,
            jitter: false,
        };

        let waits: Vec<_> = (1..=5).map(|attempt| strategy.backoff(attempt)).collect();
        assert_eq!(
            waits,
            vec![
                Some(Duration::from_millis(100)),
                Some(Duration::from_millis(200)),
                Some(Duration::from_millis(400)),
                Some(Duration::from_millis(500)),
                None,
            ]
        );
    }

    #[test]
    fn test_jitter_stays_within_half() {
        let strategy = RetryStrategy::Exponential {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(1),
            max_retries: 1,
            jitter: true,
        };
        let wait = strategy.backoff(1).unwrap();
        assert!(wait >= Duration::from_millis(50) && wait <= Duration::from_millis(100));
    }

    #[test]
    fn test_fixed_and_custom() {
        let fixed = RetryStrategy::Fixed {
            delay: Duration::from_millis(10),
            max_retries: 2,
        };
        assert_eq!(fixed.backoff(2), Some(Duration::from_millis(10)));
        assert_eq!(fixed.backoff(3), None);

        let custom = RetryStrategy::Custom(|attempt| (attempt < 2).then_some(Duration::ZERO));
        assert_eq!(custom.backoff(1), Some(Duration::ZERO));
        assert_eq!(custom.backoff(2), None);
        assert_eq!(RetryStrategy::None.backoff(1), None);
    }

    #[test]
    fn test_predicates() {
        let timeout = TransportError::Timeout;
        assert!(TransientFailures.should_retry(Attempt::Failed(&timeout), 1));
        assert!(TransientFailures.should_retry(Attempt::Status(StatusCode::TOO_MANY_REQUESTS), 1));
        assert!(!TransientFailures.should_retry(Attempt::Status(StatusCode::BAD_REQUEST), 1));

        let either = AnyOf(vec![Box::new(ServerErrors), Box::new(Timeouts)]);
        assert!(either.should_retry(Attempt::Failed(&timeout), 1));
        assert!(either.should_retry(Attempt::Status(StatusCode::BAD_GATEWAY), 1));

        let both = AllOf(vec![Box::new(ServerErrors), Box::new(Timeouts)]);
        assert!(!both.should_retry(Attempt::Status(StatusCode::BAD_GATEWAY), 1));

        let first_only = |_: Attempt<'_>, sent: usize| sent == 1;
        assert!(first_only.should_retry(Attempt::Status(StatusCode::BAD_GATEWAY), 1));
        assert!(!first_only.should_retry(Attempt::Status(StatusCode::BAD_GATEWAY), 2));
    }
}
