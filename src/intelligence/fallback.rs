//! Text-search fallback for definition/reference lookups
//!
//! Used when the semantic index cannot answer. Results are line-granular:
//! each hit spans one line with both columns at 0.

use std::sync::Arc;

use tracing::{debug, warn};

use super::Location;
use crate::error::Result;
use crate::registry::RepoRef;
use crate::scip::LookupKind;
use crate::search::{ContentMatch, ContentSearch, EngineKind};

/// A fallback hit: file plus line-granular range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackHit {
    pub file_path: String,
    pub range: Location,
}

impl From<ContentMatch> for FallbackHit {
    fn from(m: ContentMatch) -> Self {
        Self {
            range: Location::line(m.line_num),
            file_path: m.path,
        }
    }
}

/// Turns a token into candidate locations through the content search engine
#[derive(Clone)]
pub struct FallbackResolver {
    engine: Arc<dyn ContentSearch>,
}

impl FallbackResolver {
    /// Maximum hits returned per lookup
    pub const DEFAULT_LIMIT: usize = 10;

    pub fn new(engine: Arc<dyn ContentSearch>) -> Self {
        Self { engine }
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.engine.kind()
    }

    /// Resolve `token` to at most `limit` hits, in engine order
    ///
    /// The same queries serve both lookup kinds; a text match cannot tell a
    /// definition from a use.
    pub async fn resolve(
        &self,
        repo: &RepoRef,
        token: &str,
        kind: LookupKind,
        limit: usize,
    ) -> Result<Vec<FallbackHit>> {
        let word_query = format!(r"\b{}\b", token);

        let matches = match self.engine.kind() {
            EngineKind::Zoekt => {
                let sym_query = format!("sym:{}", token);
                match self.engine.search_content(repo, &sym_query).await {
                    Ok(found) if !found.is_empty() => found,
                    Ok(_) => {
                        debug!("No sym: hits for '{}', trying word search", token);
                        self.engine.search_content(repo, &word_query).await?
                    }
                    Err(e) => {
                        warn!("sym: query for '{}' failed ({}), trying word search", token, e);
                        self.engine.search_content(repo, &word_query).await?
                    }
                }
            }
            EngineKind::Ripgrep => self.engine.search_content(repo, &word_query).await?,
        };

        debug!(
            "Fallback {} lookup for '{}' in repo {}: {} matches",
            kind,
            token,
            repo.repo_id,
            matches.len()
        );

        Ok(matches
            .into_iter()
            .take(limit)
            .map(FallbackHit::from)
            .collect())
    }
}
