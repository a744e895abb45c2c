//! Zoekt client
//!
//! Talks to a zoekt-webserver through its JSON API (`POST /api/search`).
//! Results are restricted to one repository with the `RepoIDs` filter, so
//! the numeric registry id must match the `zoekt.repoid` the index was
//! built with.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::{normalize_match_path, ContentMatch, ContentSearch, EngineKind, Fragment};
use crate::error::{CodeBrowserError, Result};
use crate::registry::RepoRef;

/// Default cap on matches zoekt collects per query
pub const DEFAULT_MAX_MATCH_COUNT: usize = 1000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchRequest<'a> {
    q: &'a str,
    #[serde(rename = "RepoIDs")]
    repo_ids: [u32; 1],
    opts: SearchOpts,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchOpts {
    total_max_match_count: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResponse {
    #[serde(default)]
    result: Option<SearchResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResult {
    #[serde(default)]
    files: Option<Vec<FileMatch>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileMatch {
    file_name: String,
    #[serde(default)]
    line_matches: Option<Vec<LineMatch>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LineMatch {
    #[serde(default)]
    line: String,
    line_number: u64,
    #[serde(default)]
    line_fragments: Option<Vec<LineFragment>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LineFragment {
    line_offset: usize,
    match_length: usize,
}

/// zoekt-webserver client
#[derive(Debug, Clone)]
pub struct ZoektEngine {
    client: reqwest::Client,
    base_url: String,
    max_match_count: usize,
}

impl ZoektEngine {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CodeBrowserError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_match_count: DEFAULT_MAX_MATCH_COUNT,
        })
    }

    pub fn with_max_match_count(mut self, count: usize) -> Self {
        self.max_match_count = count;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn search(&self, repo: &RepoRef, query: &str) -> Result<SearchResponse> {
        let url = format!("{}/api/search", self.base_url);
        let body = SearchRequest {
            q: query,
            repo_ids: [repo.repo_id],
            opts: SearchOpts {
                total_max_match_count: self.max_match_count,
            },
        };

        tracing::debug!("zoekt query for repo {}: {}", repo.repo_id, query);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CodeBrowserError::search_failed(format!("Cannot reach zoekt at {}: {}", url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CodeBrowserError::search_failed(format!(
                "zoekt returned {}: {}",
                status,
                text.trim()
            )));
        }

        resp.json::<SearchResponse>()
            .await
            .map_err(|e| CodeBrowserError::search_failed(format!("Invalid zoekt response: {}", e)))
    }
}

/// `Line` is a Go `[]byte`, so it is always base64 on the wire
fn decode_line(raw: &str) -> String {
    match STANDARD.decode(raw) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(e) => {
            tracing::debug!("Discarding undecodable zoekt line {:?}: {}", raw, e);
            String::new()
        }
    }
}

fn into_matches(resp: SearchResponse) -> Vec<ContentMatch> {
    let files = resp.result.and_then(|r| r.files).unwrap_or_default();
    let mut matches = Vec::new();
    for file in files {
        let path = normalize_match_path(&file.file_name);
        for line in file.line_matches.unwrap_or_default() {
            let fragments = line
                .line_fragments
                .unwrap_or_default()
                .into_iter()
                .map(|f| Fragment {
                    offset: f.line_offset,
                    length: f.match_length,
                })
                .collect();
            matches.push(
                ContentMatch::new(path.clone(), line.line_number, decode_line(&line.line))
                    .with_fragments(fragments),
            );
        }
    }
    matches
}

fn into_file_names(resp: SearchResponse) -> Vec<String> {
    let mut seen = HashSet::new();
    resp.result
        .and_then(|r| r.files)
        .unwrap_or_default()
        .into_iter()
        .map(|f| normalize_match_path(&f.file_name))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

#[async_trait]
impl ContentSearch for ZoektEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Zoekt
    }

    async fn search_content(&self, repo: &RepoRef, query: &str) -> Result<Vec<ContentMatch>> {
        let resp = self.search(repo, query).await?;
        Ok(into_matches(resp))
    }

    async fn search_files(&self, repo: &RepoRef, query: &str) -> Result<Vec<String>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let resp = self.search(repo, &format!("f:{}", query)).await?;
        Ok(into_file_names(resp))
    }
}
