// packages/interceptor/src/interception/proxy.rs
//! HTTP/1 forward proxy running every request through the dispatcher
//!
//! Clients configured with this proxy send absolute-form requests; plain
//! origin-form requests are rebuilt from the `Host` header. CONNECT tunnels
//! are refused since TLS is not intercepted.
//!
//! Requests aimed back at the proxy itself, or already carrying this proxy's
//! `Via` entry, are answered with `508 Loop Detected` instead of forwarded.

use crate::interception::dispatcher::{Dispatcher, Route};
use crate::interception::message::InterceptedRequest;
use crate::utils::config::ServerConfig;
use crate::utils::errors::{InterceptError, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue, CONNECTION, VIA};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

/// Connection-scoped headers a proxy must not forward
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forward proxy server
pub struct ProxyServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,

    /// Unique per server, recorded in `Via` to spot requests that looped back
    pseudonym: String,
}

impl ProxyServer {
    pub fn new(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            pseudonym: format!("http-interceptor-{}", Ulid::new()),
        }
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.config.listen_addr)
            .await
            .map_err(|e| {
                InterceptError::ProxyFailed(format!(
                    "Failed to bind {}: {}",
                    self.config.listen_addr, e
                ))
            })
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn run(self: Arc<Self>, shutdown: impl Future<Output = ()>) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from `listener` until `shutdown` resolves. In-flight
    /// dispatches are cancelled on shutdown.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| InterceptError::ProxyFailed(e.to_string()))?;
        info!("Proxy listening on {}", local_addr);

        let stop = CancellationToken::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Proxy on {} shutting down", local_addr);
                    stop.cancel();
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        self.spawn_connection(stream, addr, local_addr, stop.child_token())
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }
    }

    fn spawn_connection(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        addr: SocketAddr,
        local_addr: SocketAddr,
        cancel: CancellationToken,
    ) {
        let proxy = Arc::clone(self);

        tokio::spawn(async move {
            debug!("Accepted connection from {}", addr);

            let io = TokioIo::new(stream);
            let service = service_fn(move |req| {
                let proxy = Arc::clone(&proxy);
                let cancel = cancel.clone();
                async move { proxy.handle_request(req, local_addr, cancel).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!("Connection error from {}: {}", addr, e);
            }
        });
    }

    async fn handle_request(
        &self,
        req: Request<Incoming>,
        local_addr: SocketAddr,
        cancel: CancellationToken,
    ) -> Result<Response<Full<Bytes>>> {
        if req.method() == Method::CONNECT {
            debug!("Refusing CONNECT to {}", req.uri());
            return Ok(error_response(
                StatusCode::NOT_IMPLEMENTED,
                "CONNECT tunnelling is not supported",
            ));
        }

        if self.already_forwarded(req.headers()) {
            warn!("Request for {} looped back through this proxy", req.uri());
            return Ok(error_response(
                StatusCode::LOOP_DETECTED,
                "request already passed through this proxy",
            ));
        }

        let mut request = match self.read_request(req).await {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected request: {}", e);
                return Ok(error_response(StatusCode::BAD_REQUEST, &e.to_string()));
            }
        };

        if targets_listener(&request.uri, local_addr) {
            warn!("Request for {} targets the proxy itself", request.uri);
            return Ok(error_response(
                StatusCode::LOOP_DETECTED,
                "request targets the proxy itself",
            ));
        }

        if let Ok(via) = HeaderValue::from_str(&format!("1.1 {}", self.pseudonym)) {
            request.headers.append(VIA, via);
        }

        debug!("Proxying {} {}", request.method, request.uri);

        match self.dispatcher.dispatch_with_cancel(request, cancel).await {
            Ok(dispatched) => {
                debug!(
                    "Answered via {} with {}",
                    dispatched.route.as_str(),
                    dispatched.response.status
                );

                let mut response = dispatched.response;
                if dispatched.route == Route::Passthrough {
                    strip_hop_by_hop(&mut response.headers);
                }
                Ok(response.into_hyper())
            }
            Err(e) => {
                warn!("Dispatch failed: {}", e);
                Ok(error_response(status_for(&e), &e.to_string()))
            }
        }
    }

    /// Buffer the body and resolve the absolute target URI
    async fn read_request(&self, req: Request<Incoming>) -> Result<InterceptedRequest> {
        let (mut parts, body) = req.into_parts();
        let uri = absolute_uri(&parts.uri, &parts.headers)?;

        let body = Limited::new(body, self.config.max_body_bytes)
            .collect()
            .await
            .map_err(|e| InterceptError::ProxyFailed(format!("Body read error: {}", e)))?
            .to_bytes();

        strip_hop_by_hop(&mut parts.headers);

        let mut request = InterceptedRequest::new(parts.method, uri).with_body(body);
        request.headers = parts.headers;
        Ok(request)
    }

    fn already_forwarded(&self, headers: &HeaderMap) -> bool {
        headers
            .get_all(VIA)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains(&self.pseudonym))
    }
}

fn absolute_uri(uri: &Uri, headers: &HeaderMap) -> Result<Uri> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Ok(uri.clone());
    }

    let host = headers
        .get(hyper::header::HOST)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| InterceptError::InvalidUrl(format!("{}: no Host header", uri)))?;
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    format!("http://{}{}", host, path)
        .parse()
        .map_err(|e| InterceptError::InvalidUrl(format!("{}{}: {}", host, path, e)))
}

/// True when `uri` points at the socket the proxy listens on
fn targets_listener(uri: &Uri, local_addr: SocketAddr) -> bool {
    let Some(host) = uri.host() else {
        return false;
    };
    let default_port = if uri.scheme_str() == Some("https") { 443 } else { 80 };
    if uri.port_u16().unwrap_or(default_port) != local_addr.port() {
        return false;
    }

    let listen_ip = local_addr.ip();
    let any_local = listen_ip.is_loopback() || listen_ip.is_unspecified();
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if host.eq_ignore_ascii_case("localhost") {
        return any_local;
    }

    match host.parse::<IpAddr>() {
        Ok(ip) if ip == listen_ip => true,
        Ok(ip) => listen_ip.is_unspecified() && (ip.is_loopback() || ip.is_unspecified()),
        Err(_) => false,
    }
}

/// Remove connection-scoped headers, including any named by `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// HTTP status the proxy answers with when dispatch fails
pub fn status_for(error: &InterceptError) -> StatusCode {
    match error {
        InterceptError::RemapFailed { .. } => StatusCode::NOT_FOUND,
        InterceptError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        InterceptError::InvalidUrl(_) | InterceptError::InvalidHeader(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::chain::{Responder, Verdict};
    use crate::interception::message::SyntheticResponse;
    use crate::interception::table::HandlerTable;
    use crate::interception::transport::{HyperTransport, Transport};
    use futures::future::BoxFuture;
    use hyper::header::{HOST, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE};
    use hyper_util::client::legacy::Client;
    use hyper_util::rt::TokioExecutor;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;

    /// Records forwarded requests and answers with a fixed response
    struct RecordingTransport {
        sent: Mutex<Vec<InterceptedRequest>>,
        response: SyntheticResponse,
    }

    impl RecordingTransport {
        fn new(response: SyntheticResponse) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                response,
            }
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, request: InterceptedRequest) -> BoxFuture<'_, Result<SyntheticResponse>> {
            self.sent.lock().push(request);
            let response = self.response.clone();
            Box::pin(async move { Ok(response) })
        }
    }

    /// Sends every request to a fixed socket, as a host alias for it would
    struct AliasTransport {
        target: SocketAddr,
        inner: HyperTransport,
        sent: AtomicUsize,
    }

    impl Transport for AliasTransport {
        fn send(&self, mut request: InterceptedRequest) -> BoxFuture<'_, Result<SyntheticResponse>> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            let path = request.uri.path().to_string();
            Box::pin(async move {
                request.uri = format!("http://{}{}", self.target, path).parse().unwrap();
                self.inner.send(request).await
            })
        }
    }

    struct Running {
        addr: SocketAddr,
        shutdown: CancellationToken,
        server: JoinHandle<Result<()>>,
    }

    impl Running {
        async fn stop(self) {
            self.shutdown.cancel();
            self.server.await.unwrap().unwrap();
        }
    }

    fn config(max_body_bytes: usize) -> ServerConfig {
        ServerConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            max_body_bytes,
        }
    }

    async fn serve_on(listener: TcpListener, dispatcher: Dispatcher, config: ServerConfig) -> Running {
        let addr = listener.local_addr().unwrap();
        let proxy = Arc::new(ProxyServer::new(config, Arc::new(dispatcher)));

        let shutdown = CancellationToken::new();
        let server = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { proxy.serve(listener, shutdown.cancelled_owned()).await }
        });

        Running {
            addr,
            shutdown,
            server,
        }
    }

    async fn start(table: Arc<HandlerTable>, transport: Arc<dyn Transport>) -> Running {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        serve_on(listener, Dispatcher::new(table, transport), config(1024)).await
    }

    fn client() -> Client<hyper_util::client::legacy::connect::HttpConnector, Full<Bytes>> {
        Client::builder(TokioExecutor::new()).build_http()
    }

    fn get(addr: SocketAddr, path: &str, host: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .uri(format!("http://{}{}", addr, path))
            .header(HOST, host)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    /// Write a raw request that asks for `Connection: close` and read the reply
    async fn raw_exchange(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
            .await
            .unwrap()
            .unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[test]
    fn test_absolute_uri_passthrough() {
        let uri: Uri = "http://example.com/a?b=1".parse().unwrap();
        let rebuilt = absolute_uri(&uri, &HeaderMap::new()).unwrap();
        assert_eq!(rebuilt, uri);
    }

    #[test]
    fn test_origin_form_uses_host_header() {
        let uri: Uri = "/a?b=1".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("example.com:8080"));

        let rebuilt = absolute_uri(&uri, &headers).unwrap();
        assert_eq!(rebuilt.to_string(), "http://example.com:8080/a?b=1");

        assert!(absolute_uri(&uri, &HeaderMap::new()).is_err());
    }

    #[test]
    fn test_status_mapping() {
        let remap = InterceptError::RemapFailed {
            path: PathBuf::from("/x"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(status_for(&remap), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&InterceptError::Timeout(Duration::from_secs(1))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&InterceptError::intercepted("nope")),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_targets_listener() {
        let local: SocketAddr = "127.0.0.1:8888".parse().unwrap();
        let uri = |s: &str| s.parse::<Uri>().unwrap();

        assert!(targets_listener(&uri("http://127.0.0.1:8888/"), local));
        assert!(targets_listener(&uri("http://LOCALHOST:8888/x"), local));
        assert!(!targets_listener(&uri("http://127.0.0.1:8889/"), local));
        assert!(!targets_listener(&uri("http://127.0.0.2:8888/"), local));
        assert!(!targets_listener(&uri("http://example.com:8888/"), local));

        let any: SocketAddr = "0.0.0.0:80".parse().unwrap();
        assert!(targets_listener(&uri("http://127.0.0.1/"), any));
        assert!(targets_listener(&uri("http://[::1]/"), any));
        assert!(!targets_listener(&uri("https://127.0.0.1/"), any));
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, X-Session"));
        headers.insert("x-session", HeaderValue::from_static("abc"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(PROXY_AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        headers.insert(TE, HeaderValue::from_static("trailers"));
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(TRAILER, HeaderValue::from_static("x-sum"));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("proxy-connection", HeaderValue::from_static("keep-alive"));
        headers.insert("x-end", HeaderValue::from_static("1"));

        strip_hop_by_hop(&mut headers);

        let names: Vec<_> = headers.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["x-end"]);
    }

    #[tokio::test]
    async fn test_proxy_serves_intercepted_response() {
        let table = Arc::new(HandlerTable::new());
        table.add_interceptor(|req: &InterceptedRequest, responder: Responder| {
            if req.host() != Some("mock.test") {
                return Verdict::Pass;
            }
            responder.succeed(
                SyntheticResponse::ok("hello from proxy")
                    .with_mime_type("text/plain")
                    .with_encoding("utf-8"),
            );
            Verdict::Claimed
        });
        let running = start(table, Arc::new(HyperTransport::new())).await;

        let response = client()
            .request(get(running.addr, "/greeting", "mock.test"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(hyper::header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello from proxy");

        running.stop().await;
    }

    #[tokio::test]
    async fn test_connect_is_not_implemented() {
        let transport = Arc::new(RecordingTransport::new(SyntheticResponse::ok("")));
        let running = start(Arc::new(HandlerTable::new()), transport.clone()).await;

        let reply = raw_exchange(
            running.addr,
            "CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 501"), "{}", reply);
        assert!(transport.sent.lock().is_empty());

        running.stop().await;
    }

    #[tokio::test]
    async fn test_missing_host_is_bad_request() {
        let transport = Arc::new(RecordingTransport::new(SyntheticResponse::ok("")));
        let running = start(Arc::new(HandlerTable::new()), transport.clone()).await;

        let reply = raw_exchange(running.addr, "GET /x HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 400"), "{}", reply);
        assert!(reply.contains("no Host header"), "{}", reply);
        assert!(transport.sent.lock().is_empty());

        running.stop().await;
    }

    #[tokio::test]
    async fn test_oversized_body_is_bad_request() {
        let transport = Arc::new(RecordingTransport::new(SyntheticResponse::ok("")));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dispatcher = Dispatcher::new(Arc::new(HandlerTable::new()), transport.clone());
        let running = serve_on(listener, dispatcher, config(16)).await;

        let body = "x".repeat(64);
        let request = format!(
            "POST /upload HTTP/1.1\r\nHost: any.test\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let reply = raw_exchange(running.addr, &request).await;
        assert!(reply.starts_with("HTTP/1.1 400"), "{}", reply);
        assert!(transport.sent.lock().is_empty());

        running.stop().await;
    }

    #[tokio::test]
    async fn test_remap_failure_is_not_found() {
        let table = Arc::new(HandlerTable::new());
        table
            .map_url("http://files.test", "/definitely/not/here")
            .unwrap();
        let transport = Arc::new(RecordingTransport::new(SyntheticResponse::ok("")));
        let running = start(table, transport.clone()).await;

        let response = client()
            .request(get(running.addr, "/a.txt", "files.test"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(transport.sent.lock().is_empty());

        running.stop().await;
    }

    #[tokio::test]
    async fn test_request_to_own_address_is_refused() {
        let table = Arc::new(HandlerTable::new());
        let passthroughs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&passthroughs);
        table.add_preprocessor(move |_: &mut InterceptedRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let running = start(table, Arc::new(HyperTransport::new())).await;

        let host = running.addr.to_string();
        let response = client()
            .request(get(running.addr, "/", &host))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::LOOP_DETECTED);
        assert_eq!(passthroughs.load(Ordering::SeqCst), 0);

        running.stop().await;
    }

    #[tokio::test]
    async fn test_looped_request_is_refused_by_via() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let transport = Arc::new(AliasTransport {
            target: addr,
            inner: HyperTransport::new(),
            sent: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(Arc::new(HandlerTable::new()), transport.clone());
        let running = serve_on(listener, dispatcher, config(1024)).await;

        let response = client()
            .request(get(running.addr, "/", "alias.test"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::LOOP_DETECTED);
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);

        running.stop().await;
    }

    #[tokio::test]
    async fn test_hop_by_hop_headers_are_not_forwarded() {
        let upstream = SyntheticResponse::ok("upstream")
            .with_header(CONNECTION, HeaderValue::from_static("x-hop"))
            .with_header(
                HeaderName::from_static("x-hop"),
                HeaderValue::from_static("1"),
            )
            .with_header(
                HeaderName::from_static("keep-alive"),
                HeaderValue::from_static("timeout=5"),
            )
            .with_header(
                HeaderName::from_static("x-end"),
                HeaderValue::from_static("1"),
            );
        let transport = Arc::new(RecordingTransport::new(upstream));
        let running = start(Arc::new(HandlerTable::new()), transport.clone()).await;

        let request = Request::builder()
            .uri(format!("http://{}/resource", running.addr))
            .header(HOST, "origin.test")
            .header(PROXY_AUTHORIZATION, "Basic Zm9vOmJhcg==")
            .header(CONNECTION, "x-secret")
            .header("x-secret", "1")
            .header("x-keep", "1")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = client().request(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-hop").is_none());
        assert!(response.headers().get("keep-alive").is_none());
        assert_eq!(response.headers().get("x-end").unwrap(), "1");

        {
            let sent = transport.sent.lock();
            assert_eq!(sent.len(), 1);
            let forwarded = &sent[0].headers;
            assert!(forwarded.get(PROXY_AUTHORIZATION).is_none());
            assert!(forwarded.get("x-secret").is_none());
            assert!(forwarded.get(CONNECTION).is_none());
            assert_eq!(forwarded.get("x-keep").unwrap(), "1");
            assert!(forwarded.get(VIA).is_some());
        }

        running.stop().await;
    }
}
