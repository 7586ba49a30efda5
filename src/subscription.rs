//! Long-lived subscription calls.
//!
//! The channel that carries subscription events is an external capability;
//! a [`SubscriptionCall`] only drives it until it ends or is canceled.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::call::CallState;
use crate::error::{CanceledFailure, ParseFailure};
use crate::operation::{Operation, OperationRequest};
use crate::response::ResponseBody;
use crate::{Error, Response, Result};

/// Opens and closes the long-lived channel carrying subscription events.
#[async_trait]
pub trait SubscriptionChannel: Send + Sync {
    /// Opens the channel. The stream yields zero or more events and ends
    /// when the server completes the subscription.
    async fn open(
        &self,
        request: &OperationRequest,
    ) -> Result<BoxStream<'static, Result<ResponseBody>>>;

    /// Closes the channel for this subscription.
    async fn close(&self, request: &OperationRequest);
}

/// Receives the events of a [`SubscriptionCall`].
pub trait SubscriptionCallback<T>: Send + Sync {
    /// Receives one subscription event.
    fn on_response(&self, response: Response<T>);

    /// Receives the terminal failure.
    fn on_failure(&self, error: Error);

    /// The server ended the subscription.
    fn on_completed(&self) {}
}

/// A subscription bound to one operation.
///
/// [`SubscriptionCall::execute`] runs until the stream is torn down;
/// [`SubscriptionCall::cancel`] may be called from any other task or thread.
pub struct SubscriptionCall<O: Operation> {
    operation: Arc<O>,
    request: Arc<OperationRequest>,
    channel: Arc<dyn SubscriptionChannel>,
    state: Mutex<CallState>,
    delivery: ReentrantMutex<()>,
    cancel: CancellationToken,
}

impl<O: Operation> SubscriptionCall<O> {
    pub(crate) fn new(operation: O, channel: Arc<dyn SubscriptionChannel>) -> Self {
        Self {
            request: Arc::new(OperationRequest::of(&operation)),
            operation: Arc::new(operation),
            channel,
            state: Mutex::new(CallState::Idle),
            delivery: ReentrantMutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    /// The subscribed operation.
    pub fn operation(&self) -> &O {
        &self.operation
    }

    /// The current lifecycle state.
    pub fn state(&self) -> CallState {
        *self.state.lock()
    }

    /// Returns `true` if the subscription was canceled.
    pub fn is_canceled(&self) -> bool {
        self.state() == CallState::Canceled
    }

    /// Cancels the subscription. Idempotent.
    pub fn cancel(&self) {
        let _delivery = self.delivery.lock();
        let mut state = self.state.lock();
        if matches!(*state, CallState::Idle | CallState::Executing) {
            *state = CallState::Canceled;
            self.cancel.cancel();
            tracing::debug!(operation = %O::NAME, "Canceled subscription");
        }
    }

    /// Opens the channel and delivers its events until the stream ends,
    /// fails, or the call is canceled.
    ///
    /// Fails with [`Error::IllegalState`] if the call already ran.
    pub async fn execute<C>(&self, callback: C) -> Result<()>
    where
        C: SubscriptionCallback<O::Data>,
    {
        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            if previous == CallState::Idle {
                *state = CallState::Executing;
            }
            previous
        };

        match previous {
            CallState::Idle => {}
            CallState::Canceled => {
                callback.on_failure(CanceledFailure::new(O::NAME).into());
                return Ok(());
            }
            other => {
                return Err(Error::IllegalState(format!(
                    "Already executed, subscription {} is {:?}",
                    O::NAME,
                    other
                )))
            }
        }

        tracing::debug!(operation = %O::NAME, "Opening subscription");
        let mut stream = match self.channel.open(&self.request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.terminate(|| callback.on_failure(e));
                return Ok(());
            }
        };

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = stream.next() => event,
            };

            match event {
                Some(Ok(body)) => match Response::decode(&body, false) {
                    Ok(response) => self.deliver(|| callback.on_response(response)),
                    Err(e) => {
                        let failure = ParseFailure {
                            raw_response: serde_json::to_string(&body).unwrap_or_default(),
                            serde_error: e.to_string(),
                            status: None,
                        };
                        self.terminate(|| callback.on_failure(failure.into()));
                        break;
                    }
                },
                Some(Err(e)) => {
                    self.terminate(|| callback.on_failure(e));
                    break;
                }
                None => {
                    self.terminate(|| callback.on_completed());
                    break;
                }
            }
        }

        drop(stream);
        self.channel.close(&self.request).await;
        tracing::debug!(operation = %O::NAME, "Closed subscription");
        Ok(())
    }

    fn deliver(&self, f: impl FnOnce()) {
        let _delivery = self.delivery.lock();
        if *self.state.lock() == CallState::Executing {
            f();
        }
    }

    fn terminate(&self, f: impl FnOnce()) {
        let _delivery = self.delivery.lock();
        let was_executing = {
            let mut state = self.state.lock();
            let was_executing = *state == CallState::Executing;
            if was_executing {
                *state = CallState::Completed;
            }
            was_executing
        };
        if was_executing {
            f();
        }
    }
}
