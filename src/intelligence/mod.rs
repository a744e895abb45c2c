//! Code intelligence: go-to-definition and find-references
//!
//! A lookup first asks the repository's semantic (SCIP) index. When the
//! index cannot answer (no index file, file not indexed, no symbol under the
//! cursor, or no occurrences of the requested role) the token under the
//! cursor is handed to the text-search fallback instead.
//!
//! Every returned entry records where it came from (`source`), so clients
//! can tell an exact semantic hit from a best-effort text match.
//!
//! # Coordinates
//!
//! Requests carry 0-based line and column. Responses carry 1-based lines and
//! the columns exactly as the index producer emitted them; fallback hits have
//! both columns at 0.

pub mod fallback;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CodeBrowserError, Result};
use crate::registry::{RepoRef, RepoRegistry};
use crate::scip::{LookupKind, ScipRange, SemanticIndexStore};
use crate::search::ContentSearch;
use crate::word::{line_of, word_at};

pub use fallback::{FallbackHit, FallbackResolver};

/// A lookup request from the editor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionRequest {
    #[serde(default)]
    pub repo_id: String,
    #[serde(default)]
    pub file_path: String,
    /// 0-based
    #[serde(default)]
    pub line: i32,
    /// 0-based
    #[serde(default)]
    pub character: i32,
}

impl DefinitionRequest {
    pub fn new(repo_id: impl Into<String>, file_path: impl Into<String>, line: i32, character: i32) -> Self {
        Self {
            repo_id: repo_id.into(),
            file_path: file_path.into(),
            line,
            character,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.repo_id.trim().is_empty() || self.file_path.is_empty() {
            return Err(CodeBrowserError::bad_request(
                "Missing required fields: repoId, filePath",
            ));
        }
        if self.line < 0 || self.character < 0 {
            return Err(CodeBrowserError::bad_request(format!(
                "line and character must be non-negative (got {}, {})",
                self.line, self.character
            )));
        }
        Ok(())
    }
}

/// Response range: 1-based lines, producer columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub start_line: i64,
    pub start_column: i64,
    pub end_line: i64,
    pub end_column: i64,
}

impl Location {
    /// The one place 0-based index lines become 1-based response lines
    pub fn from_scip_range(range: &ScipRange) -> Self {
        Self {
            start_line: i64::from(range.start_line) + 1,
            start_column: i64::from(range.start_column),
            end_line: i64::from(range.end_line) + 1,
            end_column: i64::from(range.end_column),
        }
    }

    /// Whole-line location for a 1-based search hit
    pub fn line(line_num: u64) -> Self {
        let line = i64::try_from(line_num).unwrap_or(i64::MAX);
        Self {
            start_line: line,
            start_column: 0,
            end_line: line,
            end_column: 0,
        }
    }
}

/// Provenance of a result entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Scip,
    Search,
}

/// One result entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionResponse {
    pub kind: LookupKind,
    pub repo_id: String,
    pub file_path: String,
    pub range: Location,
    pub source: Source,
}

/// Orchestrates the semantic lookup and the text fallback
#[derive(Clone)]
pub struct IntelligenceService {
    registry: Arc<dyn RepoRegistry>,
    store: SemanticIndexStore,
    fallback: FallbackResolver,
}

impl IntelligenceService {
    pub fn new(
        registry: Arc<dyn RepoRegistry>,
        store: SemanticIndexStore,
        engine: Arc<dyn ContentSearch>,
    ) -> Self {
        Self {
            registry,
            store,
            fallback: FallbackResolver::new(engine),
        }
    }

    pub fn store(&self) -> &SemanticIndexStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<dyn RepoRegistry> {
        &self.registry
    }

    pub async fn get_definitions(&self, request: &DefinitionRequest) -> Result<Vec<DefinitionResponse>> {
        self.lookup(request, LookupKind::Definition).await
    }

    pub async fn get_references(&self, request: &DefinitionRequest) -> Result<Vec<DefinitionResponse>> {
        self.lookup(request, LookupKind::Reference).await
    }

    async fn lookup(&self, request: &DefinitionRequest, kind: LookupKind) -> Result<Vec<DefinitionResponse>> {
        request.validate()?;

        let repo = self
            .registry
            .resolve(&request.repo_id)
            .ok_or_else(|| CodeBrowserError::NotFound {
                repo_id: request.repo_id.clone(),
            })?;

        if let Some(found) = self.semantic_lookup(&repo, request, kind).await? {
            return Ok(found);
        }

        match self.fallback_lookup(&repo, request, kind).await {
            Err(CodeBrowserError::NoSymbolAtCursor) => Ok(Vec::new()),
            other => other,
        }
    }

    /// `Ok(None)` means "let the fallback try"
    async fn semantic_lookup(
        &self,
        repo: &RepoRef,
        request: &DefinitionRequest,
        kind: LookupKind,
    ) -> Result<Option<Vec<DefinitionResponse>>> {
        let index_path = self.registry.index_path_of(repo);
        if !self.store.has_index(&index_path) {
            debug!("No semantic index for repo {}", repo.repo_id);
            return Ok(None);
        }

        let symbol = match self
            .store
            .find_symbol_at(&index_path, &request.file_path, request.line, request.character)
            .await
        {
            Ok(Some(symbol)) => symbol,
            Ok(None) => {
                debug!(
                    "No occurrence at {}:{}:{}",
                    request.file_path, request.line, request.character
                );
                return Ok(None);
            }
            Err(e) if e.is_recoverable() => {
                debug!("Semantic lookup skipped: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let locations = match self.store.occurrences_of(&index_path, &symbol, kind).await {
            Ok(locations) => locations,
            Err(e) if e.is_recoverable() => {
                warn!("Semantic index vanished mid-lookup: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if locations.is_empty() {
            debug!("Symbol {} has no {} occurrences", symbol, kind);
            return Ok(None);
        }

        Ok(Some(
            locations
                .into_iter()
                .map(|loc| DefinitionResponse {
                    kind,
                    repo_id: request.repo_id.clone(),
                    file_path: loc.document_path,
                    range: Location::from_scip_range(&loc.range),
                    source: Source::Scip,
                })
                .collect(),
        ))
    }

    async fn fallback_lookup(
        &self,
        repo: &RepoRef,
        request: &DefinitionRequest,
        kind: LookupKind,
    ) -> Result<Vec<DefinitionResponse>> {
        let blob = self
            .registry
            .read_blob(repo, &request.file_path)
            .await
            .map_err(|e| match e {
                e @ CodeBrowserError::SourceUnavailable { .. } => e,
                e @ CodeBrowserError::BadRequest { .. } => e,
                other => CodeBrowserError::SourceUnavailable {
                    path: request.file_path.clone(),
                    message: other.to_string(),
                },
            })?;
        let content = String::from_utf8_lossy(&blob);

        // validate() guarantees both are non-negative
        let line_text = line_of(&content, request.line as usize).unwrap_or("");
        let token = word_at(line_text, request.character as usize)
            .ok_or(CodeBrowserError::NoSymbolAtCursor)?;

        debug!("Falling back to text search for '{}'", token);
        let hits = self
            .fallback
            .resolve(repo, &token, kind, FallbackResolver::DEFAULT_LIMIT)
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| DefinitionResponse {
                kind,
                repo_id: request.repo_id.clone(),
                file_path: hit.file_path,
                range: hit.range,
                source: Source::Search,
            })
            .collect())
    }
}
