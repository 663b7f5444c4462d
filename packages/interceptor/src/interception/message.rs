// packages/interceptor/src/interception/message.rs
//! Request and response values flowing through dispatch

use crate::utils::errors::{InterceptError, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, Method, Response, StatusCode, Uri};
use std::borrow::Cow;

/// Outgoing request as seen by preprocessors, interceptors and the transport
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InterceptedRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Build a GET request from a URL string
    pub fn get(url: &str) -> Result<Self> {
        let uri = url
            .parse::<Uri>()
            .map_err(|e| InterceptError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self::new(Method::GET, uri))
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Full URL as a string
    pub fn url(&self) -> String {
        self.uri.to_string()
    }

    /// Host from the URI, falling back to the `Host` header
    pub fn host(&self) -> Option<&str> {
        self.uri.host().or_else(|| {
            let value = self.headers.get(hyper::header::HOST)?.to_str().ok()?;
            let host_len = value.parse::<Uri>().ok()?.host()?.len();

            // Slice the header so the host borrows from `self`
            let start = value.rfind('@').map_or(0, |at| at + 1);
            value.get(start..start + host_len)
        })
    }

    /// Replace any existing values of `name`
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Add a value to `name`, keeping existing ones
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| InterceptError::InvalidHeader(format!("{}: {}", name, e)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| InterceptError::InvalidHeader(format!("{}: {}", name, e)))?;
    Ok((name, value))
}

/// Response delivered by an interceptor, the local loader or the transport
#[derive(Debug, Clone)]
pub struct SyntheticResponse {
    pub status: StatusCode,
    pub body: Bytes,

    /// MIME type without parameters, e.g. `text/html`
    pub mime_type: Option<String>,

    /// Text encoding, rendered as the `charset` parameter
    pub encoding: Option<String>,

    pub headers: HeaderMap,
}

impl SyntheticResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            body: Bytes::new(),
            mime_type: None,
            encoding: None,
            headers: HeaderMap::new(),
        }
    }

    /// `200 OK` with the given body
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK).with_body(body)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Effective `Content-Type`: an explicit header wins over mime/encoding
    pub fn content_type(&self) -> Option<String> {
        if let Some(value) = self.headers.get(CONTENT_TYPE) {
            return value.to_str().ok().map(str::to_string);
        }

        self.mime_type.as_ref().map(|mime| match &self.encoding {
            Some(charset) => format!("{}; charset={}", mime, charset),
            None => mime.clone(),
        })
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Convert into a hyper response for the proxy server
    pub fn into_hyper(self) -> Response<Full<Bytes>> {
        let content_type = self.content_type();
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;

        if !response.headers().contains_key(CONTENT_TYPE) {
            if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
        }

        response
    }
}
