// packages/interceptor/src/utils/mod.rs
//! Common utilities: error types and configuration

pub mod config;
pub mod errors;

pub use self::config::{HeaderRule, InterceptorConfig, MappingConfig};
pub use self::errors::{BoxError, InterceptError, Result};
