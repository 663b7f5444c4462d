// packages/interceptor/src/interception/mod.rs
//! Request interception layer
//!
//! - **Handler Registry**: ordered, snapshot-on-read chains keyed by handles
//! - **Preprocessors**: mutate passthrough requests in registration order
//! - **Interceptors**: first claimer answers with a synthetic outcome
//! - **URL Remapper**: canonical URL prefix to local file or folder
//! - **Dispatcher**: remapper, then interceptors, then preprocessors + transport
//! - **Proxy**: HTTP/1 forward proxy in front of the dispatcher
//!
//! # Architecture
//!
//! ```text
//! add_preprocessor / add_interceptor / map_url
//!     │
//!     ▼
//! HandlerTable (global or owned)
//!     │ snapshot
//!     ▼
//! Dispatcher ─► LocalLoader | Responder | Transport
//!     ▲
//! ProxyServer
//! ```
//!
//! The free functions below operate on the process-wide [`global`] table.

pub mod chain;
pub mod dispatcher;
pub mod handle;
pub mod loader;
pub mod message;
pub mod proxy;
pub mod registry;
pub mod remapper;
pub mod rules;
pub mod table;
pub mod transport;

// Re-export commonly used types
pub use chain::{Delivery, Interceptor, Preprocessor, Responder, Verdict};
pub use dispatcher::{Dispatched, Dispatcher, Route};
pub use handle::{HandlerKey, HandlerKind};
pub use loader::{FsLoader, LocalLoader};
pub use message::{InterceptedRequest, SyntheticResponse};
pub use proxy::ProxyServer;
pub use registry::HandlerRegistry;
pub use remapper::{Mapping, UrlRemapper};
pub use table::{global, HandlerTable};
pub use transport::{HyperTransport, Transport};

use crate::utils::errors::Result;
use std::path::PathBuf;

pub fn add_preprocessor<P>(preprocessor: P) -> HandlerKey
where
    P: Preprocessor + 'static,
{
    global().add_preprocessor(preprocessor)
}

pub fn remove_preprocessor(key: &HandlerKey) -> bool {
    global().remove_preprocessor(key)
}

pub fn add_interceptor<I>(interceptor: I) -> HandlerKey
where
    I: Interceptor + 'static,
{
    global().add_interceptor(interceptor)
}

pub fn remove_interceptor(key: &HandlerKey) -> bool {
    global().remove_interceptor(key)
}

pub fn map_url(url: &str, local_path: impl Into<PathBuf>) -> Result<HandlerKey> {
    global().map_url(url, local_path)
}

/// Remove a preprocessor, interceptor or mapping from the global table
pub fn remove(key: &HandlerKey) -> bool {
    global().remove(key)
}
