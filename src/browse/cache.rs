//! Short-lived response cache
//!
//! Directory listings, blobs, and search results are cached per repository
//! for a fixed time-to-live. The cache is bounded by the approximate byte
//! size of its entries; failed loads are never cached.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use moka::sync::Cache;

use super::TreeEntry;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::search::{ContentMatch, EngineKind};

/// Raw file content with the type it is served as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub content: Bytes,
    pub content_type: &'static str,
}

#[derive(Clone)]
pub enum Cached {
    Tree(Arc<Vec<TreeEntry>>),
    Blob(Arc<Blob>),
    Matches(Arc<Vec<ContentMatch>>),
    Files(Arc<Vec<String>>),
}

impl Cached {
    fn weight(&self) -> u32 {
        let bytes = match self {
            Cached::Tree(entries) => entries.iter().map(|e| e.name.len() + e.path.len() + 16).sum(),
            Cached::Blob(blob) => blob.content.len(),
            Cached::Matches(matches) => matches
                .iter()
                .map(|m| m.path.len() + m.line_text.len() + 16 * (m.fragments.len() + 1))
                .sum(),
            Cached::Files(files) => files.iter().map(|f| f.len() + 8).sum(),
        };
        u32::try_from(bytes).unwrap_or(u32::MAX).max(1)
    }
}

/// Values that can live in the cache
pub trait Cacheable: Sized {
    fn wrap(value: Arc<Self>) -> Cached;
    fn unwrap(cached: &Cached) -> Option<Arc<Self>>;
}

macro_rules! cacheable {
    ($ty:ty, $variant:ident) => {
        impl Cacheable for $ty {
            fn wrap(value: Arc<Self>) -> Cached {
                Cached::$variant(value)
            }

            fn unwrap(cached: &Cached) -> Option<Arc<Self>> {
                match cached {
                    Cached::$variant(value) => Some(Arc::clone(value)),
                    _ => None,
                }
            }
        }
    };
}

cacheable!(Vec<TreeEntry>, Tree);
cacheable!(Blob, Blob);
cacheable!(Vec<ContentMatch>, Matches);
cacheable!(Vec<String>, Files);

pub fn tree_key(repo_id: u32, path: &str) -> String {
    format!("tree:{}:{}", repo_id, path)
}

pub fn blob_key(repo_id: u32, path: &str) -> String {
    format!("blob:{}:{}", repo_id, path)
}

pub fn content_search_key(engine: EngineKind, repo_id: u32, query: &str) -> String {
    format!("search:content:{}:{}:{}", engine, repo_id, query)
}

pub fn file_search_key(engine: EngineKind, repo_id: u32, query: &str) -> String {
    format!("search:files:{}:{}:{}", engine, repo_id, query)
}

fn belongs_to(key: &str, repo_id: u32) -> bool {
    let mut parts = key.split(':');
    let id = match parts.next() {
        Some("tree") | Some("blob") => parts.next(),
        Some("search") => parts.nth(2),
        _ => None,
    };
    id.and_then(|id| id.parse::<u32>().ok()) == Some(repo_id)
}

/// Cache shared by the browse and search routes
#[derive(Clone)]
pub struct ResponseCache {
    inner: Option<Cache<String, Cached>>,
}

impl ResponseCache {
    /// `ttl_secs == 0` yields a cache that stores nothing
    pub fn new(config: &CacheConfig) -> Self {
        if config.ttl_secs == 0 {
            return Self::disabled();
        }
        let inner = Cache::builder()
            .max_capacity(config.max_bytes)
            .weigher(|_key: &String, value: &Cached| value.weight())
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .support_invalidation_closures()
            .build();
        Self { inner: Some(inner) }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn get<T: Cacheable>(&self, key: &str) -> Option<Arc<T>> {
        let cached = self.inner.as_ref()?.get(key)?;
        T::unwrap(&cached)
    }

    pub fn insert<T: Cacheable>(&self, key: String, value: Arc<T>) {
        if let Some(inner) = &self.inner {
            inner.insert(key, T::wrap(value));
        }
    }

    /// Cached value for `key`, or the result of `load` (stored on success)
    pub async fn get_or_load<T, F, Fut>(&self, key: String, load: F) -> Result<Arc<T>>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get::<T>(&key) {
            tracing::debug!("Cache hit: {}", key);
            return Ok(hit);
        }
        let value = Arc::new(load().await?);
        self.insert(key, Arc::clone(&value));
        Ok(value)
    }

    /// Drop every entry for one repository
    pub fn invalidate_repo(&self, repo_id: u32) {
        let Some(inner) = &self.inner else {
            return;
        };
        if let Err(e) = inner.invalidate_entries_if(move |key, _| belongs_to(key, repo_id)) {
            tracing::warn!("Falling back to a full cache flush for repo {}: {}", repo_id, e);
            inner.invalidate_all();
        }
    }
}
