// packages/interceptor/src/interception/chain.rs
//! Preprocessor and interceptor callbacks
//!
//! Preprocessors mutate a passthrough request in place. Interceptors inspect a
//! request and either pass, or claim it and answer through a single-shot
//! [`Responder`] that may be moved to another task and fired later.

use crate::interception::message::{InterceptedRequest, SyntheticResponse};
use crate::utils::errors::{BoxError, InterceptError, Result};
use std::fmt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Mutates an outgoing request before it reaches the transport
pub trait Preprocessor: Send + Sync {
    fn preprocess(&self, request: &mut InterceptedRequest);
}

impl<F> Preprocessor for F
where
    F: Fn(&mut InterceptedRequest) + Send + Sync,
{
    fn preprocess(&self, request: &mut InterceptedRequest) {
        self(request)
    }
}

/// Interceptor decision for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Verdict {
    /// Not interested; the responder is revoked and the next interceptor runs
    Pass,
    /// The interceptor owns the request and will fire its responder
    Claimed,
}

/// May replace the network round-trip with a synthetic outcome
pub trait Interceptor: Send + Sync {
    fn intercept(&self, request: &InterceptedRequest, responder: Responder) -> Verdict;
}

impl<F> Interceptor for F
where
    F: Fn(&InterceptedRequest, Responder) -> Verdict + Send + Sync,
{
    fn intercept(&self, request: &InterceptedRequest, responder: Responder) -> Verdict {
        self(request, responder)
    }
}

/// What happened to a value handed to a [`Responder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The request was cancelled, or the interceptor had passed
    Discarded,
}

/// Single-shot success/failure continuation for one interception
pub struct Responder {
    tx: oneshot::Sender<Result<SyntheticResponse>>,
    cancel: CancellationToken,
}

impl Responder {
    pub(crate) fn channel(
        cancel: CancellationToken,
    ) -> (Self, oneshot::Receiver<Result<SyntheticResponse>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx, cancel }, rx)
    }

    /// Answer the request with a synthetic response
    pub fn succeed(self, response: SyntheticResponse) -> Delivery {
        self.deliver(Ok(response))
    }

    /// Fail the request; the error reaches the caller as the source of
    /// [`InterceptError::Intercepted`]
    pub fn fail<E>(self, error: E) -> Delivery
    where
        E: Into<BoxError>,
    {
        self.deliver(Err(InterceptError::intercepted(error)))
    }

    /// True once nobody is waiting for this responder any more
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    fn deliver(self, outcome: Result<SyntheticResponse>) -> Delivery {
        if self.cancel.is_cancelled() {
            return Delivery::Discarded;
        }

        match self.tx.send(outcome) {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::Discarded,
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
