//! Request classification for intercepted traffic.
//!
//! Every same-origin request the worker sees lands in one of three buckets.
//! Static assets pass straight through without logging; API requests are
//! answered from the handler set or reported as misses; everything else is
//! only mentioned at debug level in development mode.

use super::handlers::{HandlerSet, MockHandler};
use crate::models::HttpMethod;
use once_cell::sync::Lazy;
use std::collections::HashSet;

const STATIC_PREFIXES: &[&str] = &[
    "/assets/",
    "/static/",
    "/build/",
    "/dist/",
    "/public/",
    "/_next/",
    "/@vite/",
    "/@fs/",
    "/@id/",
    "/node_modules/",
    "/src/",
    "/favicon",
];

const API_PREFIXES: &[&str] = &[
    "/api/", "/v1/", "/v2/", "/v3/", "/graphql", "/rpc/", "/jsonrpc", "/trpc/",
];

static STATIC_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // script
        "js", "mjs", "cjs", "jsx", "ts", "tsx", "map", "wasm",
        // style
        "css", "scss", "sass", "less",
        // image
        "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico", "bmp",
        // font
        "woff", "woff2", "ttf", "otf", "eot",
        // media
        "mp3", "mp4", "webm", "ogg", "wav", "m4a",
        // document
        "pdf", "txt", "md", "doc", "docx",
        // archive
        "zip", "gz", "tar", "tgz", "7z", "rar",
        // data
        "json", "xml", "csv", "yaml", "yml", "webmanifest",
        // markup
        "html", "htm",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBucket {
    Static,
    Api,
    Other,
}

/// An API request no handler answered. Never fatal; logged for the
/// developer with the closest registered route, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationMiss {
    pub method: HttpMethod,
    pub path: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Mocked(MockHandler),
    Passthrough(RequestBucket),
    Miss(ClassificationMiss),
}

pub struct RequestClassifier {
    handlers: HandlerSet,
    dev_mode: bool,
}

impl RequestClassifier {
    pub fn new(handlers: HandlerSet, dev_mode: bool) -> Self {
        Self { handlers, dev_mode }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Bucket for a request path (query string and fragment ignored).
    pub fn bucket(path: &str) -> RequestBucket {
        let path = strip_query(path);
        let lower = path.to_ascii_lowercase();

        if STATIC_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            return RequestBucket::Static;
        }
        if API_PREFIXES
            .iter()
            .any(|p| lower.starts_with(p) || lower == p.trim_end_matches('/'))
        {
            return RequestBucket::Api;
        }
        if let Some(ext) = extension(&lower) {
            if STATIC_EXTENSIONS.contains(ext) {
                return RequestBucket::Static;
            }
        }
        RequestBucket::Other
    }

    /// Classify and log a request the way the worker would.
    pub fn classify(&self, method: HttpMethod, path: &str) -> Classification {
        let path = strip_query(path);
        match Self::bucket(path) {
            RequestBucket::Static => Classification::Passthrough(RequestBucket::Static),
            RequestBucket::Api => match self.handlers.find(method, path) {
                Some(handler) => {
                    tracing::debug!("Mocked {} {}", method, path);
                    Classification::Mocked(handler.clone())
                }
                None => {
                    let miss = ClassificationMiss {
                        method,
                        path: path.to_string(),
                        suggestion: self.nearest_match(path),
                    };
                    match &miss.suggestion {
                        Some(suggestion) => tracing::warn!(
                            "No mock handler for {} {} (did you mean {}?)",
                            method,
                            path,
                            suggestion
                        ),
                        None => tracing::warn!("No mock handler for {} {}", method, path),
                    }
                    Classification::Miss(miss)
                }
            },
            RequestBucket::Other => {
                if self.dev_mode {
                    tracing::debug!("Passing through {} {}", method, path);
                }
                Classification::Passthrough(RequestBucket::Other)
            }
        }
    }

    /// Best-effort suggestion by substring containment in either direction,
    /// preferring the longest registered path.
    fn nearest_match(&self, path: &str) -> Option<String> {
        let needle = path.trim_end_matches('/');
        if needle.is_empty() {
            return None;
        }
        self.handlers
            .iter()
            .filter(|h| {
                let candidate = h.path.trim_end_matches('/');
                candidate.contains(needle) || needle.contains(candidate)
            })
            .max_by_key(|h| h.path.len())
            .map(|h| format!("{} {}", h.method, h.path))
    }
}

fn strip_query(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

fn extension(path: &str) -> Option<&str> {
    let last_segment = path.rsplit('/').next()?;
    let (stem, ext) = last_segment.rsplit_once('.')?;
    if stem.is_empty() && ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}
