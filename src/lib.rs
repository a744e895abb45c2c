//! code-browser: self-hosted code browsing with SCIP-backed code intelligence
//!
//! Repositories are registered in a small SQLite registry. Each one may carry
//! a SCIP index produced by an external indexer; when it does, definition and
//! reference lookups are answered exactly from that index. Otherwise (or when
//! the index has nothing under the cursor) the identifier under the cursor is
//! resolved through content search, backed by either zoekt or ripgrep.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use code_browser::{DefinitionRequest, IntelligenceService, SemanticIndexStore, SqliteRegistry};
//! use code_browser::search::RipgrepEngine;
//!
//! let registry = Arc::new(SqliteRegistry::open("/var/lib/code-browser".as_ref())?);
//! let service = IntelligenceService::new(
//!     registry,
//!     SemanticIndexStore::new(),
//!     Arc::new(RipgrepEngine::default()),
//! );
//!
//! let request = DefinitionRequest::new("1", "pkg/server.go", 41, 12);
//! for hit in service.get_definitions(&request).await? {
//!     println!("{}:{} ({:?})", hit.file_path, hit.range.start_line, hit.source);
//! }
//! ```

pub mod browse;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod http;
pub mod intelligence;
pub mod registry;
pub mod scip;
pub mod search;
pub mod word;

// Re-export commonly used types
pub use browse::{ResponseCache, TreeEntry};
pub use cli::Cli;
pub use config::ServerConfig;
pub use error::{CodeBrowserError, Result};
pub use intelligence::{
    DefinitionRequest, DefinitionResponse, FallbackResolver, IntelligenceService, Location, Source,
};
pub use registry::{RepoRef, RepoRegistry, SqliteRegistry};
pub use scip::{LookupKind, SemanticIndex, SemanticIndexStore};
pub use search::{ContentMatch, ContentSearch, EngineKind, SearchEngines};
pub use word::word_at;
