// packages/interceptor/src/interception/loader.rs
//! Local resource loader for remapped URLs

use crate::interception::message::SyntheticResponse;
use crate::utils::errors::{InterceptError, Result};
use futures::future::BoxFuture;
use std::path::Path;
use tracing::{debug, warn};

/// Reads the local resource a mapping points at
pub trait LocalLoader: Send + Sync {
    fn load<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<SyntheticResponse>>;
}

/// Reads files with `tokio::fs`; directories and missing files fail
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl LocalLoader for FsLoader {
    fn load<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<SyntheticResponse>> {
        Box::pin(async move {
            let body = tokio::fs::read(path).await.map_err(|source| {
                warn!("Failed to read mapped resource {:?}: {}", path, source);
                InterceptError::RemapFailed {
                    path: path.to_path_buf(),
                    source,
                }
            })?;

            debug!("Serving {} bytes from {:?}", body.len(), path);
            Ok(SyntheticResponse::ok(body).with_mime_type(mime_type_for(path)))
        })
    }
}

/// MIME type guessed from the file extension
pub fn mime_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") | Some("mjs") => "text/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}
