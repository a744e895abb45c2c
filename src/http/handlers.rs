//! Route table and request handlers

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::browse::cache::{self, Blob};
use crate::browse::{self, TreeEntry};
use crate::error::{CodeBrowserError, Result};
use crate::intelligence::{DefinitionRequest, DefinitionResponse};
use crate::registry::{parse_repo_id, validate_relative_path, RepoRef};
use crate::search::ContentMatch;

use super::AppState;

/// Coordinate convention of intelligence responses
const LINE_BASE_HEADER: &str = "x-line-base";
const COLUMN_BASE_HEADER: &str = "x-column-base";

pub(super) fn router(state: Arc<AppState>, request_timeout: Duration) -> axum::Router {
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::timeout::TimeoutLayer;
    use tower_http::trace::TraceLayer;

    axum::Router::new()
        .route("/api/intelligence/definitions", post(definitions))
        .route("/api/intelligence/references", post(references))
        .route("/api/repositories", get(list_repositories))
        .route("/api/repositories/{id}/tree", get(get_tree))
        .route("/api/repositories/{id}/blob", get(get_blob))
        .route("/api/repositories/{id}/search", get(search_content))
        .route("/api/repositories/{id}/search-files", get(search_files))
        .route("/api/repositories/{id}/scip/reload", post(reload_index))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// -- /api/intelligence --

type LookupBody = std::result::Result<Json<DefinitionRequest>, JsonRejection>;

fn lookup_response(found: Vec<DefinitionResponse>) -> impl IntoResponse {
    (
        [(LINE_BASE_HEADER, "1"), (COLUMN_BASE_HEADER, "0")],
        Json(found),
    )
}

fn parse_body(body: LookupBody) -> Result<DefinitionRequest> {
    body.map(|Json(request)| request)
        .map_err(|e| CodeBrowserError::bad_request(format!("Invalid request body: {}", e.body_text())))
}

async fn definitions(State(state): State<Arc<AppState>>, body: LookupBody) -> Result<impl IntoResponse> {
    let request = parse_body(body)?;
    let found = state.intelligence.get_definitions(&request).await?;
    tracing::debug!(
        "definitions {}:{}:{} -> {}",
        request.file_path,
        request.line,
        request.character,
        found.len()
    );
    Ok(lookup_response(found))
}

async fn references(State(state): State<Arc<AppState>>, body: LookupBody) -> Result<impl IntoResponse> {
    let request = parse_body(body)?;
    let found = state.intelligence.get_references(&request).await?;
    tracing::debug!(
        "references {}:{}:{} -> {}",
        request.file_path,
        request.line,
        request.character,
        found.len()
    );
    Ok(lookup_response(found))
}

// -- /api/repositories --

#[derive(Debug, Serialize)]
struct RepoSummary {
    id: String,
    name: String,
}

async fn list_repositories(State(state): State<Arc<AppState>>) -> Json<Vec<RepoSummary>> {
    let repos = state
        .registry()
        .list()
        .into_iter()
        .map(|r| RepoSummary {
            id: r.repo_id.to_string(),
            name: r.name,
        })
        .collect();
    Json(repos)
}

fn repo_from_path(state: &AppState, raw_id: &str) -> Result<RepoRef> {
    if parse_repo_id(raw_id).is_none() {
        return Err(CodeBrowserError::bad_request(format!(
            "Invalid repository id: '{}'",
            raw_id
        )));
    }
    state
        .registry()
        .resolve(raw_id)
        .ok_or_else(|| CodeBrowserError::NotFound {
            repo_id: raw_id.to_string(),
        })
}

#[derive(Debug, Deserialize)]
struct PathParams {
    #[serde(default)]
    path: String,
}

async fn get_tree(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<PathParams>,
) -> Result<Response> {
    let repo = repo_from_path(&state, &id)?;
    let entries = state
        .cache
        .get_or_load(cache::tree_key(repo.repo_id, &params.path), || {
            browse::list_tree(&repo, &params.path)
        })
        .await?;
    Ok(Json(entries.as_slice() as &[TreeEntry]).into_response())
}

async fn get_blob(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<PathParams>,
) -> Result<Response> {
    let repo = repo_from_path(&state, &id)?;
    if params.path.is_empty() {
        return Err(CodeBrowserError::bad_request("Query parameter 'path' is required"));
    }
    validate_relative_path(&params.path)
        .map_err(|_| CodeBrowserError::bad_request(format!("Invalid path: '{}'", params.path)))?;
    if repo.source_path.join(&params.path).is_dir() {
        return Err(CodeBrowserError::bad_request(format!(
            "'{}' is a directory",
            params.path
        )));
    }

    let registry = Arc::clone(state.registry());
    let blob = state
        .cache
        .get_or_load(cache::blob_key(repo.repo_id, &params.path), || async {
            let content = registry.read_blob(&repo, &params.path).await?;
            Ok(Blob {
                content_type: browse::content_type_of(&content),
                content: content.into(),
            })
        })
        .await?;
    Ok(([(header::CONTENT_TYPE, blob.content_type)], blob.content.clone()).into_response())
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    engine: Option<String>,
}

async fn search_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Response> {
    let repo = repo_from_path(&state, &id)?;
    if params.q.is_empty() {
        return Err(CodeBrowserError::bad_request("Query parameter 'q' is required"));
    }
    let engine = state.engines.select(params.engine.as_deref())?;
    let key = cache::content_search_key(engine.kind(), repo.repo_id, &params.q);
    let matches = state
        .cache
        .get_or_load(key, || engine.search_content(&repo, &params.q))
        .await?;
    Ok(Json(matches.as_slice() as &[ContentMatch]).into_response())
}

async fn search_files(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Response> {
    let repo = repo_from_path(&state, &id)?;
    let engine = state.engines.select(params.engine.as_deref())?;
    if params.q.is_empty() {
        return Ok(Json(Vec::<String>::new()).into_response());
    }
    let key = cache::file_search_key(engine.kind(), repo.repo_id, &params.q);
    let files = state
        .cache
        .get_or_load(key, || engine.search_files(&repo, &params.q))
        .await?;
    Ok(Json(files.as_slice() as &[String]).into_response())
}

/// Drops the cached semantic index and every cached response for the
/// repository
async fn reload_index(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode> {
    let repo = repo_from_path(&state, &id)?;
    let index_path = state.registry().index_path_of(&repo);
    state.intelligence.store().invalidate(&index_path);
    state.cache.invalidate_repo(repo.repo_id);
    Ok(StatusCode::NO_CONTENT)
}
