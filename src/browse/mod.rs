//! File browsing: directory listings and raw file content
//!
//! Listings come from the `HEAD` tree when the source is a git repository,
//! so they match what the semantic index and blob reads see. Directories
//! that are not committed (and plain source trees) are listed from disk.

pub mod cache;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CodeBrowserError, Result};
use crate::git::{self, ObjectKind};
use crate::registry::{validate_relative_path, RepoRef};

pub use cache::ResponseCache;

/// Entry kind in a directory listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    /// Path from the repository root, `/`-separated
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// Directory part of a tree request: `""`, `"."` and `"/"` all mean the root
fn normalize_dir(relative_dir: &str) -> Result<String> {
    let trimmed = relative_dir.trim_start_matches("./").trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return Ok(String::new());
    }
    validate_relative_path(trimmed).map_err(|_| {
        CodeBrowserError::bad_request(format!("Invalid path: '{}'", relative_dir))
    })?;
    Ok(trimmed.to_string())
}

fn entry(dir: &str, name: String, kind: EntryKind) -> TreeEntry {
    let path = if dir.is_empty() {
        name.clone()
    } else {
        format!("{}/{}", dir, name)
    };
    TreeEntry { name, path, kind }
}

/// Children of `relative_dir` under `source_path`
pub fn list_directory(source_path: &Path, relative_dir: &str) -> Result<Vec<TreeEntry>> {
    let dir = normalize_dir(relative_dir)?;

    if git::is_git_repo(source_path) {
        match git::ls_tree("HEAD", &dir, source_path) {
            Ok(children) => {
                return Ok(children
                    .into_iter()
                    .map(|(kind, name)| {
                        let kind = match kind {
                            ObjectKind::Blob => EntryKind::File,
                            ObjectKind::Tree | ObjectKind::Commit => EntryKind::Directory,
                        };
                        entry(&dir, name, kind)
                    })
                    .collect())
            }
            Err(e) => tracing::debug!("Listing '{}' from the working tree: {}", dir, e),
        }
    }

    let full_path = source_path.join(&dir);
    let read = fs::read_dir(&full_path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CodeBrowserError::PathNotFound { path: dir.clone() },
        std::io::ErrorKind::NotADirectory => {
            CodeBrowserError::bad_request(format!("'{}' is not a directory", dir))
        }
        _ => CodeBrowserError::SourceUnavailable {
            path: dir.clone(),
            message: e.to_string(),
        },
    })?;

    let mut entries = Vec::new();
    for item in read {
        let item = item?;
        let name = item.file_name().to_string_lossy().into_owned();
        if dir.is_empty() && name == ".git" {
            continue;
        }
        let kind = if item.file_type()?.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        entries.push(entry(&dir, name, kind));
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Async wrapper over [`list_directory`] for a registered repository
pub async fn list_tree(repo: &RepoRef, relative_dir: &str) -> Result<Vec<TreeEntry>> {
    let source_path = repo.source_path.clone();
    let relative_dir = relative_dir.to_string();
    tokio::task::spawn_blocking(move || list_directory(&source_path, &relative_dir))
        .await
        .map_err(|e| CodeBrowserError::Io(std::io::Error::other(e.to_string())))?
}

/// Content type served for a blob
///
/// Common image formats keep their type; everything else is served as UTF-8
/// text, which is what the browser's code view expects.
pub fn content_type_of(content: &[u8]) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"RIFF", "image/webp"),
    ];
    for (magic, content_type) in SIGNATURES {
        if content.starts_with(magic) {
            if *content_type == "image/webp" && content.get(8..12) != Some(b"WEBP".as_slice()) {
                continue;
            }
            return content_type;
        }
    }
    "text/plain; charset=utf-8"
}
