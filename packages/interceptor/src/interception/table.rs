// packages/interceptor/src/interception/table.rs
//! Handler table: the registration API over all three chains
//!
//! A process normally uses the lazily created [`global`] table; tests and
//! embedders that want isolation create their own.

use crate::interception::chain::{Interceptor, Preprocessor};
use crate::interception::handle::{HandlerKey, HandlerKind};
use crate::interception::registry::HandlerRegistry;
use crate::interception::remapper::UrlRemapper;
use crate::utils::errors::Result;
use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

static GLOBAL: Lazy<Arc<HandlerTable>> = Lazy::new(|| Arc::new(HandlerTable::new()));

/// Process-wide handler table, empty at startup
pub fn global() -> Arc<HandlerTable> {
    Arc::clone(&GLOBAL)
}

/// Preprocessors, interceptors and URL mappings
pub struct HandlerTable {
    preprocessors: HandlerRegistry<dyn Preprocessor>,
    interceptors: HandlerRegistry<dyn Interceptor>,
    remapper: UrlRemapper,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self {
            preprocessors: HandlerRegistry::new(HandlerKind::Preprocessor),
            interceptors: HandlerRegistry::new(HandlerKind::Interceptor),
            remapper: UrlRemapper::new(),
        }
    }

    pub fn add_preprocessor<P>(&self, preprocessor: P) -> HandlerKey
    where
        P: Preprocessor + 'static,
    {
        self.preprocessors.register(Arc::new(preprocessor))
    }

    pub fn remove_preprocessor(&self, key: &HandlerKey) -> bool {
        self.preprocessors.unregister(key)
    }

    pub fn add_interceptor<I>(&self, interceptor: I) -> HandlerKey
    where
        I: Interceptor + 'static,
    {
        self.interceptors.register(Arc::new(interceptor))
    }

    pub fn remove_interceptor(&self, key: &HandlerKey) -> bool {
        self.interceptors.unregister(key)
    }

    /// Serve `url` and everything below it from `local_path`
    pub fn map_url(&self, url: &str, local_path: impl Into<PathBuf>) -> Result<HandlerKey> {
        self.remapper.map(url, local_path)
    }

    pub fn unmap_url(&self, key: &HandlerKey) -> bool {
        self.remapper.unmap(key)
    }

    /// Remove whatever `key` was issued for
    pub fn remove(&self, key: &HandlerKey) -> bool {
        match key.kind() {
            HandlerKind::Preprocessor => self.remove_preprocessor(key),
            HandlerKind::Interceptor => self.remove_interceptor(key),
            HandlerKind::Mapping => self.unmap_url(key),
        }
    }

    pub fn preprocessors(&self) -> &HandlerRegistry<dyn Preprocessor> {
        &self.preprocessors
    }

    pub fn interceptors(&self) -> &HandlerRegistry<dyn Interceptor> {
        &self.interceptors
    }

    pub fn remapper(&self) -> &UrlRemapper {
        &self.remapper
    }

    /// Drop every handler and mapping
    pub fn clear(&self) {
        self.preprocessors.clear();
        self.interceptors.clear();
        self.remapper.clear();
        info!("Cleared handler table");
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}
