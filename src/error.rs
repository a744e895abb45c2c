//! Error types and HTTP status mapping for code-browser

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for code-browser operations
#[derive(Error, Debug)]
pub enum CodeBrowserError {
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Repository '{repo_id}' not found")]
    NotFound { repo_id: String },

    #[error("Path '{path}' not found")]
    PathNotFound { path: String },

    #[error("No semantic index at {path}")]
    NoIndex { path: PathBuf },

    #[error("Document '{path}' is not in the semantic index")]
    DocumentMissing { path: String },

    #[error("Semantic index {path} is corrupt: {message}")]
    IndexCorrupt { path: PathBuf, message: String },

    #[error("Cannot read source file '{path}': {message}")]
    SourceUnavailable { path: String, message: String },

    #[error("No symbol at cursor")]
    NoSymbolAtCursor,

    #[error("Search failed: {message}")]
    SearchFailed { message: String },

    #[error("Registry error: {message}")]
    Registry { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodeBrowserError {
    /// HTTP status for the error:
    /// - 400: bad request
    /// - 404: unknown repository or path
    /// - 200: no symbol at cursor (served as an empty list)
    /// - 500: everything else that reaches a handler
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } | Self::PathNotFound { .. } => StatusCode::NOT_FOUND,
            Self::NoSymbolAtCursor => StatusCode::OK,
            Self::NoIndex { .. }
            | Self::DocumentMissing { .. }
            | Self::IndexCorrupt { .. }
            | Self::SourceUnavailable { .. }
            | Self::SearchFailed { .. }
            | Self::Registry { .. }
            | Self::Config { .. }
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the semantic path may give way to the search fallback
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoIndex { .. } | Self::DocumentMissing { .. })
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn search_failed(message: impl Into<String>) -> Self {
        Self::SearchFailed {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for CodeBrowserError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Registry {
            message: e.to_string(),
        }
    }
}

impl IntoResponse for CodeBrowserError {
    fn into_response(self) -> Response {
        if let Self::NoSymbolAtCursor = self {
            return axum::Json(Vec::<()>::new()).into_response();
        }
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Result type alias for code-browser operations
pub type Result<T> = std::result::Result<T, CodeBrowserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CodeBrowserError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CodeBrowserError::NotFound {
                repo_id: "7".into()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CodeBrowserError::PathNotFound {
                path: "pkg/gone.go".into()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CodeBrowserError::search_failed("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            CodeBrowserError::IndexCorrupt {
                path: PathBuf::from("index.scip"),
                message: "truncated".into()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_recoverable_kinds() {
        assert!(CodeBrowserError::NoIndex {
            path: PathBuf::from("x")
        }
        .is_recoverable());
        assert!(CodeBrowserError::DocumentMissing { path: "a.go".into() }.is_recoverable());
        assert!(!CodeBrowserError::search_failed("x").is_recoverable());
        assert!(!CodeBrowserError::NoSymbolAtCursor.is_recoverable());
    }
}
