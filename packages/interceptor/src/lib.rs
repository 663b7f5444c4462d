// packages/interceptor/src/lib.rs
//! HTTP request interception library
//!
//! Hooks into an outgoing request pipeline to preprocess requests, answer
//! them with synthetic responses, or serve them from local files.
//!
//! # Modules
//!
//! - **interception**: handler registry, URL remapper, dispatch core, proxy
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and error types
//!
//! # Example
//!
//! ```no_run
//! use http_interceptor::interception::{self, Responder, SyntheticResponse, Verdict};
//!
//! let key = interception::add_interceptor(|req: &interception::InterceptedRequest, responder: Responder| {
//!     if req.host() != Some("api.example.com") {
//!         return Verdict::Pass;
//!     }
//!     responder.succeed(SyntheticResponse::ok("{}").with_mime_type("application/json"));
//!     Verdict::Claimed
//! });
//!
//! interception::remove(&key);
//! ```

pub mod interception;
pub mod observability;
pub mod utils;

// Re-export commonly used types
pub use interception::{Dispatcher, HandlerKey, HandlerTable, InterceptedRequest, SyntheticResponse};
pub use utils::config::InterceptorConfig;
pub use utils::errors::{InterceptError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
