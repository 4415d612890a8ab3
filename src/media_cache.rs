//! Token-addressed media cache
//!
//! Backs the retrieval endpoint for assets rendered per-request instead of
//! being written to the on-disk cache. Tokens are issued per render
//! context from a process-wide counter and are never derived from content:
//! two renders producing identical bytes still get distinct tokens, so a
//! stale token can be invalidated by simply rendering again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Issue a fresh media token
pub fn issue_token() -> u64 {
    TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// What the HTTP boundary should serve for a lookup
///
/// A miss is recovered locally into a not-found response; it is not an
/// error anywhere inside the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaResponse {
    Content(Vec<u8>),
    NotFound,
}

impl MediaResponse {
    /// HTTP status code the host should respond with
    pub fn status(&self) -> u16 {
        match self {
            Self::Content(_) => 200,
            Self::NotFound => 404,
        }
    }
}

/// In-memory store keyed by (render token, asset path)
#[derive(Debug, Default)]
pub struct MediaCache {
    entries: Mutex<HashMap<(u64, String), Vec<u8>>>,
}

impl MediaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, token: u64, asset_path: &str, content: impl Into<Vec<u8>>) {
        let mut entries = self.entries.lock().expect("media cache lock poisoned");
        entries.insert((token, asset_path.to_string()), content.into());
    }

    pub fn get(&self, token: u64, asset_path: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().expect("media cache lock poisoned");
        entries.get(&(token, asset_path.to_string())).cloned()
    }

    /// Boundary lookup: a miss becomes a not-found response
    pub fn respond(&self, token: u64, asset_path: &str) -> MediaResponse {
        match self.get(token, asset_path) {
            Some(content) => MediaResponse::Content(content),
            None => MediaResponse::NotFound,
        }
    }
}

/// URL a token-addressed asset is served from
pub fn token_url(prefix: &str, token: u64, asset_path: &str) -> String {
    format!("/{}/{}/{}", prefix.trim_matches('/'), token, asset_path)
}
