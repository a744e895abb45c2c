//! Common fixtures for code-browser integration tests
//!
//! - `TestEnv`: a temp data directory with a SQLite registry holding one
//!   repository, a source tree, and helpers to install SCIP indices
//! - `RecordingEngine`: a `ContentSearch` double that records queries
//! - request helpers for driving the axum router with `oneshot`

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use parking_lot::Mutex;
use prost::Message;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use code_browser::config::CacheConfig;
use code_browser::http::{self, AppState};
use code_browser::scip::proto;
use code_browser::{
    CodeBrowserError, ContentMatch, ContentSearch, EngineKind, IntelligenceService, RepoRef,
    ResponseCache, Result, SearchEngines, SemanticIndexStore, SqliteRegistry,
};

pub const REPO_ID: u32 = 1;

/// Content search double
pub struct RecordingEngine {
    kind: EngineKind,
    matches: Vec<ContentMatch>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl RecordingEngine {
    pub fn new(kind: EngineKind, matches: Vec<ContentMatch>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            matches,
            fail: false,
            queries: Mutex::new(Vec::new()),
        })
    }

    /// Fails every query; used to prove the fallback was never consulted
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            kind: EngineKind::Ripgrep,
            matches: Vec::new(),
            fail: true,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl ContentSearch for RecordingEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    async fn search_content(&self, _repo: &RepoRef, query: &str) -> Result<Vec<ContentMatch>> {
        self.queries.lock().push(query.to_string());
        if self.fail {
            return Err(CodeBrowserError::search_failed("search engine unavailable"));
        }
        Ok(self.matches.clone())
    }

    async fn search_files(&self, _repo: &RepoRef, query: &str) -> Result<Vec<String>> {
        self.queries.lock().push(format!("files:{}", query));
        Ok(Vec::new())
    }
}

/// `n` matches in distinct files, in engine order
pub fn matches(n: u64) -> Vec<ContentMatch> {
    (1..=n)
        .map(|i| ContentMatch::new(format!("pkg/f{:02}.go", i), i, "foo_bar()"))
        .collect()
}

pub fn occurrence(range: &[i32], symbol: &str, definition: bool) -> proto::Occurrence {
    proto::Occurrence {
        range: range.to_vec(),
        symbol: symbol.to_string(),
        symbol_roles: if definition {
            proto::SYMBOL_ROLE_DEFINITION
        } else {
            0
        },
    }
}

pub fn document(path: &str, occurrences: Vec<proto::Occurrence>) -> proto::Document {
    proto::Document {
        relative_path: path.to_string(),
        occurrences,
    }
}

/// Temp data directory + registry with one repository
pub struct TestEnv {
    dir: TempDir,
    pub registry: Arc<SqliteRegistry>,
    pub store: SemanticIndexStore,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = dir.path().join("src");
        fs::create_dir_all(&source).unwrap();

        let registry = SqliteRegistry::open(&dir.path().join("data")).unwrap();
        registry.add(REPO_ID, "demo", &source).unwrap();

        Self {
            dir,
            registry: Arc::new(registry),
            store: SemanticIndexStore::new(),
        }
    }

    pub fn source_dir(&self) -> PathBuf {
        self.dir.path().join("src")
    }

    pub fn repo(&self) -> RepoRef {
        self.registry.get(REPO_ID).unwrap()
    }

    pub fn write_source(&self, relative_path: &str, content: &str) -> &Self {
        let path = self.source_dir().join(relative_path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    /// Encode an index and install it through the registry
    pub fn install_index(&self, documents: Vec<proto::Document>) -> PathBuf {
        let index = proto::Index {
            metadata: None,
            documents,
        };
        self.install_raw_index(&index.encode_to_vec())
    }

    pub fn install_raw_index(&self, bytes: &[u8]) -> PathBuf {
        let staged = self.dir.path().join("incoming.scip");
        fs::write(&staged, bytes).unwrap();
        self.registry.register_scip(REPO_ID, &staged).unwrap()
    }

    pub fn service(&self, engine: Arc<dyn ContentSearch>) -> IntelligenceService {
        IntelligenceService::new(self.registry.clone(), self.store.clone(), engine)
    }

    fn state(&self, engine: Arc<dyn ContentSearch>) -> AppState {
        AppState::new(self.service(engine.clone()), SearchEngines::single(engine))
    }

    pub fn app(&self, engine: Arc<dyn ContentSearch>) -> axum::Router {
        http::router(Arc::new(self.state(engine)), Duration::from_secs(5))
    }

    /// Same as `app`, with an enabled response cache
    pub fn cached_app(&self, engine: Arc<dyn ContentSearch>) -> axum::Router {
        let cache = ResponseCache::new(&CacheConfig {
            ttl_secs: 60,
            max_bytes: 1024 * 1024,
        });
        http::router(Arc::new(self.state(engine).with_cache(cache)), Duration::from_secs(5))
    }

    /// App serving two engines, `default` unless a request picks `other`
    pub fn two_engine_app(
        &self,
        default: Arc<dyn ContentSearch>,
        other: Arc<dyn ContentSearch>,
    ) -> axum::Router {
        let engines = SearchEngines::single(default.clone()).with(other);
        let state = AppState::new(self.service(default), engines);
        http::router(Arc::new(state), Duration::from_secs(5))
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

pub struct JsonResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

async fn into_json(resp: axum::response::Response) -> JsonResponse {
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::String(
        String::from_utf8_lossy(&bytes).into_owned(),
    ));
    JsonResponse {
        status,
        headers,
        body,
    }
}

/// POST a lookup to `/api/intelligence/<kind>`
pub async fn lookup(app: axum::Router, kind: &str, file: &str, line: i32, character: i32) -> JsonResponse {
    let body = serde_json::json!({
        "repoId": REPO_ID.to_string(),
        "filePath": file,
        "line": line,
        "character": character,
    });
    let request = Request::post(format!("/api/intelligence/{}", kind))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    into_json(app.oneshot(request).await.unwrap()).await
}

pub async fn get(app: axum::Router, uri: &str) -> JsonResponse {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    into_json(app.oneshot(request).await.unwrap()).await
}

pub async fn post_empty(app: axum::Router, uri: &str) -> JsonResponse {
    let request = Request::post(uri).body(Body::empty()).unwrap();
    into_json(app.oneshot(request).await.unwrap()).await
}

/// `[startLine, startColumn, endLine, endColumn]` of a response entry
pub fn range_of(entry: &Value) -> [i64; 4] {
    let r = &entry["range"];
    [
        r["startLine"].as_i64().unwrap(),
        r["startColumn"].as_i64().unwrap(),
        r["endLine"].as_i64().unwrap(),
        r["endColumn"].as_i64().unwrap(),
    ]
}
