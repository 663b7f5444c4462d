// packages/interceptor/src/interception/dispatcher.rs
//! Dispatch core
//!
//! Every outgoing request walks the same three stages:
//!
//! ```text
//! request ─► URL remapper ── hit ──────────────► local loader   (Route::Local)
//!                │ miss
//!                ▼
//!            interceptors ── first claim ──────► responder      (Route::Intercepted)
//!                │ all pass
//!                ▼
//!            preprocessors (all, in order) ────► transport      (Route::Passthrough)
//! ```
//!
//! Chains are snapshotted when a stage starts, so handlers registered or
//! removed mid-dispatch only affect later requests.

use crate::interception::chain::{Responder, Verdict};
use crate::interception::loader::{FsLoader, LocalLoader};
use crate::interception::message::{InterceptedRequest, SyntheticResponse};
use crate::interception::table::HandlerTable;
use crate::interception::transport::Transport;
use crate::utils::errors::{InterceptError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Terminal state of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Served from a mapped local resource
    Local,
    /// Answered by an interceptor
    Intercepted,
    /// Preprocessed and sent through the transport
    Passthrough,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Local => "local",
            Route::Intercepted => "intercepted",
            Route::Passthrough => "passthrough",
        }
    }
}

/// Successful dispatch result
#[derive(Debug)]
pub struct Dispatched {
    pub route: Route,
    pub response: SyntheticResponse,
}

/// Routes requests through the remapper, interceptors and transport
pub struct Dispatcher {
    table: Arc<HandlerTable>,
    transport: Arc<dyn Transport>,
    loader: Arc<dyn LocalLoader>,
    interception_timeout: Option<Duration>,
}

impl Dispatcher {
    /// Create a dispatcher reading files with [`FsLoader`]
    pub fn new(table: Arc<HandlerTable>, transport: Arc<dyn Transport>) -> Self {
        Self {
            table,
            transport,
            loader: Arc::new(FsLoader),
            interception_timeout: None,
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn LocalLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Bound how long a claiming interceptor may take to respond
    pub fn with_interception_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.interception_timeout = timeout;
        self
    }

    pub fn table(&self) -> &Arc<HandlerTable> {
        &self.table
    }

    /// Dispatch a request that cannot be cancelled
    pub async fn dispatch(&self, request: InterceptedRequest) -> Result<Dispatched> {
        self.dispatch_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Dispatch a request; cancelling `cancel` ends the dispatch with
    /// [`InterceptError::Cancelled`] and turns pending responders into no-ops.
    pub async fn dispatch_with_cancel(
        &self,
        request: InterceptedRequest,
        cancel: CancellationToken,
    ) -> Result<Dispatched> {
        let result = self.route(request, &cancel).await;

        match &result {
            Ok(dispatched) => {
                metrics::counter!("interceptor_dispatch_total", "route" => dispatched.route.as_str())
                    .increment(1);
            }
            Err(e) => {
                debug!("Dispatch failed: {}", e);
                metrics::counter!("interceptor_dispatch_errors_total", "kind" => e.kind())
                    .increment(1);
            }
        }

        result
    }

    async fn route(
        &self,
        mut request: InterceptedRequest,
        cancel: &CancellationToken,
    ) -> Result<Dispatched> {
        if cancel.is_cancelled() {
            return Err(InterceptError::Cancelled);
        }

        if let Some(path) = self.table.remapper().resolve(&request.uri)? {
            debug!("Serving {} from {:?}", request.uri, path);

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(InterceptError::Cancelled),
                loaded = self.loader.load(&path) => loaded?,
            };

            return Ok(Dispatched {
                route: Route::Local,
                response,
            });
        }

        let interceptors = self.table.interceptors().snapshot();
        for entry in interceptors.iter() {
            let (responder, rx) = Responder::channel(cancel.clone());

            match entry.handler.intercept(&request, responder) {
                Verdict::Pass => continue,
                Verdict::Claimed => {
                    debug!("Interceptor {} claimed {}", entry.key, request.uri);
                    let response = self.await_responder(rx, cancel).await?;

                    return Ok(Dispatched {
                        route: Route::Intercepted,
                        response,
                    });
                }
            }
        }

        let preprocessors = self.table.preprocessors().snapshot();
        for entry in preprocessors.iter() {
            entry.handler.preprocess(&mut request);
        }

        debug!(
            "Passing {} {} through to transport ({} preprocessors)",
            request.method,
            request.uri,
            preprocessors.len()
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(InterceptError::Cancelled),
            sent = self.transport.send(request) => sent?,
        };

        Ok(Dispatched {
            route: Route::Passthrough,
            response,
        })
    }

    async fn await_responder(
        &self,
        rx: oneshot::Receiver<Result<SyntheticResponse>>,
        cancel: &CancellationToken,
    ) -> Result<SyntheticResponse> {
        let outcome = async {
            let received = async { rx.await.unwrap_or(Err(InterceptError::Abandoned)) };

            match self.interception_timeout {
                Some(limit) => tokio::time::timeout(limit, received).await.unwrap_or_else(|_| {
                    warn!("Interceptor did not respond within {:?}", limit);
                    Err(InterceptError::Timeout(limit))
                }),
                None => received.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(InterceptError::Cancelled),
            result = outcome => result,
        }
    }
}
