// packages/interceptor/src/interception/transport.rs
//! Request transport used on the passthrough path

use crate::interception::message::{InterceptedRequest, SyntheticResponse};
use crate::utils::errors::{InterceptError, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

/// Sends a request that no interceptor claimed. Errors are reported as
/// [`InterceptError::Transport`] and passed to the caller unchanged.
pub trait Transport: Send + Sync {
    fn send(&self, request: InterceptedRequest) -> BoxFuture<'_, Result<SyntheticResponse>>;
}

/// Plain HTTP transport over hyper's pooled client
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn send(&self, request: InterceptedRequest) -> BoxFuture<'_, Result<SyntheticResponse>> {
        Box::pin(async move {
            debug!("Sending {} {}", request.method, request.uri);

            let mut outgoing = Request::new(Full::new(request.body));
            *outgoing.method_mut() = request.method;
            *outgoing.uri_mut() = request.uri;
            *outgoing.headers_mut() = request.headers;

            let response = self.client.request(outgoing).await.map_err(|e| {
                warn!("Transport error: {}", e);
                InterceptError::transport(e)
            })?;

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(InterceptError::transport)?
                .to_bytes();

            let mut synthetic = SyntheticResponse::new(parts.status).with_body(body);
            synthetic.headers = parts.headers;
            Ok(synthetic)
        })
    }
}
