// packages/interceptor/src/utils/errors.rs
//! Error types for the interception layer
//!
//! Registration never fails, so every variant here describes why a single
//! request did not complete, or why the process could not be configured.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Opaque error carried through from an interceptor or transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by dispatch, the proxy server and configuration loading
#[derive(Debug, Error)]
pub enum InterceptError {
    /// An interceptor claimed the request and signalled failure.
    #[error("request failed in interceptor: {0}")]
    Intercepted(#[source] BoxError),

    /// A mapped local resource could not be read.
    #[error("mapped resource {path:?} is unreadable: {source}")]
    RemapFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The transport failed; the inner error is passed through unchanged.
    #[error("transport failed: {0}")]
    Transport(#[source] BoxError),

    #[error("request was cancelled")]
    Cancelled,

    /// An interceptor claimed the request but dropped its responder.
    #[error("interceptor claimed the request without responding")]
    Abandoned,

    #[error("interceptor did not respond within {0:?}")]
    Timeout(Duration),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("proxy failed: {0}")]
    ProxyFailed(String),
}

impl InterceptError {
    /// Wrap any error produced by an interceptor's failure path.
    pub fn intercepted<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Intercepted(error.into())
    }

    /// Wrap any error produced by the transport.
    pub fn transport<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Transport(error.into())
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Intercepted(_) => "intercepted",
            Self::RemapFailed { .. } => "remap",
            Self::Transport(_) => "transport",
            Self::Cancelled => "cancelled",
            Self::Abandoned => "abandoned",
            Self::Timeout(_) => "timeout",
            Self::InvalidUrl(_) => "invalid_url",
            Self::InvalidHeader(_) => "invalid_header",
            Self::ConfigError(_) => "config",
            Self::ProxyFailed(_) => "proxy",
        }
    }
}

impl From<config::ConfigError> for InterceptError {
    fn from(error: config::ConfigError) -> Self {
        Self::ConfigError(error.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, InterceptError>;
