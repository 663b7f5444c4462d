// packages/interceptor/src/interception/remapper.rs
//! URL remapper: serves canonical URLs from local files and folders
//!
//! A mapping covers its own URL and everything below it. Path segments past
//! the mapped prefix are appended to the local path, so mapping a folder
//! serves the files inside it:
//!
//! ```text
//! http://assets.local/static        → /srv/www
//! http://assets.local/static/a.css  → /srv/www/a.css
//! http://assets.local/static/       → /srv/www           (trailing slash ignored)
//! http://assets.local:80/static     → no mapping         (authority differs)
//! ```

use crate::interception::handle::{HandlerKey, HandlerKind};
use crate::utils::errors::{InterceptError, Result};
use dashmap::DashMap;
use hyper::Uri;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// A registered URL mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub key: HandlerKey,

    /// Canonical form of the mapped URL
    pub url: String,

    pub local_path: PathBuf,
}

/// Canonical URL → local path table
pub struct UrlRemapper {
    /// Canonical URL to mapping
    mappings: DashMap<String, Mapping>,

    /// Handle to canonical URL, for removal by handle
    keys: DashMap<HandlerKey, String>,

    /// Segment count of the deepest mapping ever added since the last clear
    max_depth: AtomicUsize,
}

struct CanonicalUrl {
    origin: String,
    segments: Vec<String>,
}

impl CanonicalUrl {
    fn parse(uri: &Uri) -> Option<Self> {
        let scheme = uri.scheme_str()?.to_ascii_lowercase();
        let authority = uri.authority()?.as_str().to_ascii_lowercase();
        let segments = uri
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Some(Self {
            origin: format!("{}://{}", scheme, authority),
            segments,
        })
    }

    /// Canonical string of the first `depth` segments
    fn prefix(&self, depth: usize) -> String {
        let mut url = self.origin.clone();
        for segment in &self.segments[..depth] {
            url.push('/');
            url.push_str(segment);
        }
        url
    }
}

impl UrlRemapper {
    /// Create an empty remapper
    pub fn new() -> Self {
        Self {
            mappings: DashMap::new(),
            keys: DashMap::new(),
            max_depth: AtomicUsize::new(0),
        }
    }

    /// Map `url` (and everything below it) to `local_path`. Re-mapping a URL
    /// replaces the previous mapping and invalidates its handle.
    pub fn map(&self, url: &str, local_path: impl Into<PathBuf>) -> Result<HandlerKey> {
        let uri = url
            .parse::<Uri>()
            .map_err(|e| InterceptError::InvalidUrl(format!("{}: {}", url, e)))?;
        let canonical = CanonicalUrl::parse(&uri).ok_or_else(|| {
            InterceptError::InvalidUrl(format!("{}: scheme and host are required", url))
        })?;

        let canonical_url = canonical.prefix(canonical.segments.len());
        let key = HandlerKey::generate(HandlerKind::Mapping);
        let mapping = Mapping {
            key,
            url: canonical_url.clone(),
            local_path: local_path.into(),
        };

        info!("Mapping {} -> {:?}", canonical_url, mapping.local_path);

        self.max_depth
            .fetch_max(canonical.segments.len(), Ordering::AcqRel);
        self.keys.insert(key, canonical_url.clone());
        if let Some(previous) = self.mappings.insert(canonical_url, mapping) {
            self.keys.remove(&previous.key);
            debug!("Replaced mapping {}", previous.key);
        }

        Ok(key)
    }

    /// Remove a mapping by handle. Stale and unknown handles are no-ops.
    pub fn unmap(&self, key: &HandlerKey) -> bool {
        let Some((_, url)) = self.keys.remove(key) else {
            return false;
        };

        let removed = self.mappings.remove_if(&url, |_, m| m.key == *key).is_some();
        if removed {
            info!("Removed mapping for {}", url);
        }
        removed
    }

    /// Local path serving `uri`, if any mapping covers it. Fails when the
    /// remaining path would escape the mapped root.
    pub fn resolve(&self, uri: &Uri) -> Result<Option<PathBuf>> {
        if self.mappings.is_empty() {
            return Ok(None);
        }
        let Some(canonical) = CanonicalUrl::parse(uri) else {
            return Ok(None);
        };

        // Nothing deeper than the deepest mapping can match
        let mut depth = canonical
            .segments
            .len()
            .min(self.max_depth.load(Ordering::Acquire));
        let mut candidate = canonical.prefix(depth);

        loop {
            if let Some(mapping) = self.mappings.get(&candidate) {
                debug!("Resolved {} via mapping {}", uri, mapping.url);
                let path = join_segments(&mapping.local_path, &canonical.segments[depth..])?;
                return Ok(Some(path));
            }

            if depth == 0 {
                return Ok(None);
            }
            depth -= 1;
            candidate.truncate(candidate.len() - canonical.segments[depth].len() - 1);
        }
    }

    /// All mappings, sorted by URL
    pub fn mappings(&self) -> Vec<Mapping> {
        let mut all: Vec<Mapping> = self.mappings.iter().map(|m| m.value().clone()).collect();
        all.sort_by(|a, b| a.url.cmp(&b.url));
        all
    }

    pub fn contains(&self, key: &HandlerKey) -> bool {
        self.keys
            .get(key)
            .and_then(|url| self.mappings.get(url.value()).map(|m| m.key == *key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn clear(&self) {
        self.mappings.clear();
        self.keys.clear();
        self.max_depth.store(0, Ordering::Release);
        info!("Cleared all mappings");
    }
}

impl Default for UrlRemapper {
    fn default() -> Self {
        Self::new()
    }
}

fn join_segments(root: &Path, segments: &[String]) -> Result<PathBuf> {
    let mut path = root.to_path_buf();

    for raw in segments {
        let segment = percent_decode(raw);
        if segment == "." || segment == ".." || segment.contains(&['/', '\\', '\0'][..]) {
            return Err(InterceptError::RemapFailed {
                path: root.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("path segment {:?} escapes the mapped root", raw),
                ),
            });
        }
        path.push(segment);
    }

    Ok(path)
}

/// Decode `%XX` escapes; malformed escapes are kept literally
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(high), Some(low)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push(high << 4 | low);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
