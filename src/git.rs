//! Git access for blob reads and tree listings
//!
//! Uses subprocess calls to git, matching whatever git the host has
//! installed. Blob contents are returned untouched; only metadata queries
//! trim their output.

use std::path::Path;
use std::process::Command;

use crate::error::{CodeBrowserError, Result};

/// Run a git command and return raw stdout
pub fn git_output(args: &[&str], cwd: &Path) -> Result<Vec<u8>> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| CodeBrowserError::SourceUnavailable {
            path: cwd.display().to_string(),
            message: format!("Failed to execute git: {}", e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CodeBrowserError::SourceUnavailable {
            path: cwd.display().to_string(),
            message: format!("git {} failed: {}", args.join(" "), stderr.trim()),
        });
    }

    Ok(output.stdout)
}

/// Check whether `cwd` is inside a git work tree
pub fn is_git_repo(cwd: &Path) -> bool {
    git_output(&["rev-parse", "--is-inside-work-tree"], cwd)
        .map(|out| String::from_utf8_lossy(&out).trim() == "true")
        .unwrap_or(false)
}

/// `<ref>:./<path>`, which git resolves against `cwd` rather than the
/// top of the work tree
fn cwd_object(ref_name: &str, relative_path: &str) -> String {
    format!("{}:./{}", ref_name, relative_path.trim_start_matches("./"))
}

/// Contents of `file_path` (relative to `cwd`) at `ref_name`
pub fn show_blob(ref_name: &str, file_path: &str, cwd: &Path) -> Result<Vec<u8>> {
    git_output(&["show", &cwd_object(ref_name, file_path)], cwd)
}

/// Object type of a tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
    /// Submodule
    Commit,
}

/// Direct children of `dir` (relative to `cwd`, empty for `cwd` itself) at
/// `ref_name`, in git's tree order
pub fn ls_tree(ref_name: &str, dir: &str, cwd: &Path) -> Result<Vec<(ObjectKind, String)>> {
    let out = git_output(&["ls-tree", "-z", &cwd_object(ref_name, dir)], cwd)?;
    Ok(parse_ls_tree(&out))
}

/// `<mode> SP <type> SP <object> TAB <name> NUL` records
fn parse_ls_tree(out: &[u8]) -> Vec<(ObjectKind, String)> {
    out.split(|&b| b == 0)
        .filter_map(|record| {
            let record = String::from_utf8_lossy(record);
            let (meta, name) = record.split_once('\t')?;
            let kind = match meta.split(' ').nth(1)? {
                "blob" => ObjectKind::Blob,
                "tree" => ObjectKind::Tree,
                "commit" => ObjectKind::Commit,
                _ => return None,
            };
            Some((kind, name.to_string()))
        })
        .collect()
}
