//! Content search engines
//!
//! Two interchangeable backends sit behind [`ContentSearch`]:
//!
//! - **Zoekt** (`zoekt`): structural code search over HTTP; understands
//!   `sym:` queries
//! - **Ripgrep** (`ripgrep`): line-oriented regex search, run as a child
//!   process inside the repository's source tree
//!
//! Both are built at startup and held in [`SearchEngines`]. The configured
//! engine is the default; search routes may pick the other per request.
//! Callers that need to shape queries per engine branch on
//! [`ContentSearch::kind`].

pub mod ripgrep;
pub mod zoekt;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::error::{CodeBrowserError, Result};
use crate::registry::RepoRef;

pub use ripgrep::RipgrepEngine;
pub use zoekt::ZoektEngine;

/// Engine identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Structural code search (sym:, regex, substring)
    Zoekt,
    /// Line-oriented regex search
    Ripgrep,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Zoekt => "zoekt",
            EngineKind::Ripgrep => "ripgrep",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matched byte span within a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub offset: usize,
    pub length: usize,
}

/// A single matching line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMatch {
    /// Path relative to the repository root, `/`-separated
    pub path: String,

    /// Line number (1-indexed)
    pub line_num: u64,

    /// Content of the matching line, trimmed
    pub line_text: String,

    #[serde(default)]
    pub fragments: Vec<Fragment>,
}

impl ContentMatch {
    pub fn new(path: impl Into<String>, line_num: u64, line_text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line_num,
            line_text: line_text.into(),
            fragments: Vec::new(),
        }
    }

    pub fn with_fragments(mut self, fragments: Vec<Fragment>) -> Self {
        self.fragments = fragments;
        self
    }
}

/// Uniform query contract over both engines
///
/// All failures surface as `SearchFailed`; an empty result is not an error.
#[async_trait]
pub trait ContentSearch: Send + Sync {
    fn kind(&self) -> EngineKind;

    async fn search_content(&self, repo: &RepoRef, query: &str) -> Result<Vec<ContentMatch>>;

    async fn search_files(&self, repo: &RepoRef, query: &str) -> Result<Vec<String>>;
}

/// The available engines, one per kind, plus which one is the default
#[derive(Clone)]
pub struct SearchEngines {
    default: EngineKind,
    engines: Vec<Arc<dyn ContentSearch>>,
}

impl SearchEngines {
    /// A set holding only `engine`, which becomes the default
    pub fn single(engine: Arc<dyn ContentSearch>) -> Self {
        Self {
            default: engine.kind(),
            engines: vec![engine],
        }
    }

    /// Add `engine`, replacing any engine of the same kind
    pub fn with(mut self, engine: Arc<dyn ContentSearch>) -> Self {
        let kind = engine.kind();
        self.engines.retain(|e| e.kind() != kind);
        self.engines.push(engine);
        self
    }

    pub fn default_kind(&self) -> EngineKind {
        self.default
    }

    pub fn default_engine(&self) -> Arc<dyn ContentSearch> {
        self.get(self.default)
            .unwrap_or_else(|| Arc::clone(&self.engines[0]))
    }

    pub fn get(&self, kind: EngineKind) -> Option<Arc<dyn ContentSearch>> {
        self.engines.iter().find(|e| e.kind() == kind).cloned()
    }

    pub fn kinds(&self) -> Vec<EngineKind> {
        self.engines.iter().map(|e| e.kind()).collect()
    }

    /// Engine for a request's `engine` parameter; absent or empty means the
    /// default
    pub fn select(&self, name: Option<&str>) -> Result<Arc<dyn ContentSearch>> {
        let name = match name.map(str::trim) {
            None | Some("") => return Ok(self.default_engine()),
            Some(name) => name,
        };
        <EngineKind as ValueEnum>::from_str(name, true)
            .ok()
            .and_then(|kind| self.get(kind))
            .ok_or_else(|| {
                let available: Vec<_> = self.kinds().iter().map(EngineKind::as_str).collect();
                CodeBrowserError::bad_request(format!(
                    "Invalid search engine: {}. Available: {}",
                    name,
                    available.join(", ")
                ))
            })
    }
}

fn build(kind: EngineKind, config: &SearchConfig) -> Result<Arc<dyn ContentSearch>> {
    Ok(match kind {
        EngineKind::Zoekt => Arc::new(
            ZoektEngine::new(&config.zoekt_url, Duration::from_secs(config.zoekt_timeout_secs))?
                .with_max_match_count(config.max_match_count),
        ),
        EngineKind::Ripgrep => Arc::new(
            RipgrepEngine::new(&config.rg_binary).with_max_count(config.rg_max_count),
        ),
    })
}

/// Build the configured engine
pub fn build_engine(config: &SearchConfig) -> Result<Arc<dyn ContentSearch>> {
    build(config.engine, config)
}

/// Build every engine, with the configured one as the default
pub fn build_engines(config: &SearchConfig) -> Result<SearchEngines> {
    let mut engines = SearchEngines::single(build_engine(config)?);
    for kind in [EngineKind::Zoekt, EngineKind::Ripgrep] {
        if kind != config.engine {
            engines = engines.with(build(kind, config)?);
        }
    }
    tracing::info!("Using {} search engine by default", engines.default_kind());
    Ok(engines)
}

/// Normalize an engine-reported path to repository-relative, `/`-separated form
pub(crate) fn normalize_match_path(path: &str) -> String {
    let slashed = path.replace('\\', "/");
    slashed.trim_start_matches("./").to_string()
}
