//! Ripgrep subprocess engine
//!
//! Runs `rg --json` inside a repository's source tree and streams the
//! match messages back as [`ContentMatch`]es. Exit status 1 means "no
//! matches" and is not an error; anything above that is.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::{normalize_match_path, ContentMatch, ContentSearch, EngineKind, Fragment};
use crate::error::{CodeBrowserError, Result};
use crate::registry::RepoRef;

/// Default per-file match cap (`rg -m`)
pub const DEFAULT_MAX_COUNT: usize = 100;

// ============================================================================
// rg --json message shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct RgMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// rg reports UTF-8 data as `text`, anything else as base64 `bytes`
#[derive(Debug, Default, Deserialize)]
struct RgData {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    bytes: Option<String>,
}

impl RgData {
    fn into_string(self) -> Option<String> {
        if let Some(text) = self.text {
            return Some(text);
        }
        let bytes = STANDARD.decode(self.bytes?).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[derive(Debug, Deserialize)]
struct RgMatch {
    path: RgData,
    lines: RgData,
    #[serde(default)]
    line_number: Option<u64>,
    #[serde(default)]
    submatches: Vec<RgSubmatch>,
}

#[derive(Debug, Deserialize)]
struct RgSubmatch {
    start: usize,
    end: usize,
}

/// Parse one line of `rg --json` output
///
/// Returns `None` for non-match messages (begin, end, context, summary) and
/// for lines that fail to parse; the latter are logged.
fn parse_json_line(line: &str) -> Option<ContentMatch> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let message: RgMessage = match serde_json::from_str(line) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("Skipping unparseable rg output: {} ({})", e, line);
            return None;
        }
    };
    if message.kind != "match" {
        return None;
    }

    let data: RgMatch = match message.data.map(serde_json::from_value) {
        Some(Ok(data)) => data,
        Some(Err(e)) => {
            tracing::warn!("Skipping malformed rg match: {}", e);
            return None;
        }
        None => return None,
    };

    let path = data.path.into_string()?;
    let text = data.lines.into_string().unwrap_or_default();
    let fragments = data
        .submatches
        .iter()
        .filter(|s| s.end >= s.start)
        .map(|s| Fragment {
            offset: s.start,
            length: s.end - s.start,
        })
        .collect();

    Some(
        ContentMatch::new(
            normalize_match_path(&path),
            data.line_number.unwrap_or(0),
            text.trim(),
        )
        .with_fragments(fragments),
    )
}

/// Escape glob metacharacters so the query is matched literally
fn escape_glob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    for c in pattern.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '{' | '}' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ============================================================================
// Engine
// ============================================================================

/// Ripgrep-backed content search
#[derive(Debug, Clone)]
pub struct RipgrepEngine {
    binary: PathBuf,
    max_count: usize,
}

impl Default for RipgrepEngine {
    fn default() -> Self {
        Self::new("rg")
    }
}

impl RipgrepEngine {
    pub fn new(binary: impl AsRef<Path>) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
            max_count: DEFAULT_MAX_COUNT,
        }
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Check whether the configured binary can be found
    pub fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }

    /// Run rg in `cwd`, feeding each stdout line to `on_line`
    ///
    /// stderr is drained concurrently so a chatty rg never blocks on a full
    /// pipe. Returns the collected items when rg exits with 0 or 1.
    async fn run<T>(
        &self,
        cwd: &Path,
        args: &[&str],
        mut on_line: impl FnMut(&[u8]) -> Option<T>,
    ) -> Result<Vec<T>> {
        if !cwd.is_dir() {
            return Err(CodeBrowserError::search_failed(format!(
                "Source tree not found: {}",
                cwd.display()
            )));
        }

        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CodeBrowserError::search_failed(format!(
                    "Failed to start {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CodeBrowserError::search_failed("rg stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CodeBrowserError::search_failed("rg stderr not captured"))?;

        let read_stdout = async {
            let mut items = Vec::new();
            let mut segments = BufReader::new(stdout).split(b'\n');
            while let Some(segment) = segments.next_segment().await? {
                if let Some(item) = on_line(&segment) {
                    items.push(item);
                }
            }
            Ok::<_, std::io::Error>(items)
        };

        let (items, stderr_text) = tokio::try_join!(read_stdout, drain(stderr))
            .map_err(|e| CodeBrowserError::search_failed(format!("Failed to read rg output: {}", e)))?;

        let status = child
            .wait()
            .await
            .map_err(|e| CodeBrowserError::search_failed(format!("Failed to wait for rg: {}", e)))?;

        match status.code() {
            Some(0) | Some(1) => Ok(items),
            code => {
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                Err(CodeBrowserError::search_failed(format!(
                    "rg exited with {}: {}",
                    code,
                    stderr_text.trim()
                )))
            }
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<String> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[async_trait]
impl ContentSearch for RipgrepEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Ripgrep
    }

    async fn search_content(&self, repo: &RepoRef, query: &str) -> Result<Vec<ContentMatch>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let max_count = self.max_count.to_string();
        let args = ["--json", "-i", "-m", max_count.as_str(), "--", query, "."];

        tracing::debug!("rg in {}: {}", repo.source_path.display(), query);
        self.run(&repo.source_path, &args, |line| {
            parse_json_line(&String::from_utf8_lossy(line))
        })
        .await
    }

    async fn search_files(&self, repo: &RepoRef, query: &str) -> Result<Vec<String>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let glob = format!("*{}*", escape_glob(query));
        let args = ["--files", "--iglob", glob.as_str()];

        self.run(&repo.source_path, &args, |line| {
            let path = String::from_utf8_lossy(line);
            let path = path.trim();
            (!path.is_empty()).then(|| normalize_match_path(path))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn repo_at(path: &Path) -> RepoRef {
        RepoRef {
            repo_id: 1,
            name: "demo".into(),
            source_path: path.to_path_buf(),
            data_path: path.join(".data"),
        }
    }

    const MATCH_LINE: &str = r#"{"type":"match","data":{"path":{"text":"./pkg/a.go"},"lines":{"text":"  foo_bar()\n"},"line_number":3,"absolute_offset":40,"submatches":[{"match":{"text":"foo_bar"},"start":2,"end":9}]}}"#;

    #[test]
    fn test_parse_match_message() {
        let m = parse_json_line(MATCH_LINE).unwrap();
        assert_eq!(m.path, "pkg/a.go");
        assert_eq!(m.line_num, 3);
        assert_eq!(m.line_text, "foo_bar()");
        assert_eq!(m.fragments, vec![Fragment { offset: 2, length: 7 }]);
    }

    #[test]
    fn test_parse_skips_other_messages() {
        assert!(parse_json_line(r#"{"type":"begin","data":{"path":{"text":"a.go"}}}"#).is_none());
        assert!(parse_json_line(r#"{"type":"summary","data":{"elapsed_total":{}}}"#).is_none());
        assert!(parse_json_line("not json").is_none());
        assert!(parse_json_line("").is_none());
    }

    #[test]
    fn test_parse_bytes_path() {
        let line = format!(
            r#"{{"type":"match","data":{{"path":{{"bytes":"{}"}},"lines":{{"text":"x"}},"line_number":1,"submatches":[]}}}}"#,
            STANDARD.encode("./weird.go")
        );
        assert_eq!(parse_json_line(&line).unwrap().path, "weird.go");
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("main.go"), "main.go");
        assert_eq!(escape_glob("a*b?[c]"), "a\\*b\\?\\[c\\]");
    }

    #[tokio::test]
    async fn test_missing_binary_is_search_failed() {
        let dir = TempDir::new().unwrap();
        let engine = RipgrepEngine::new("/nonexistent/rg-binary");
        assert!(!engine.is_available());
        let err = engine.search_content(&repo_at(dir.path()), "foo").await.unwrap_err();
        assert!(matches!(err, CodeBrowserError::SearchFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_source_tree_is_search_failed() {
        let engine = RipgrepEngine::default();
        let repo = repo_at(Path::new("/nonexistent/source/tree"));
        let err = engine.search_files(&repo, "a").await.unwrap_err();
        assert!(matches!(err, CodeBrowserError::SearchFailed { .. }));
    }

    #[cfg(unix)]
    mod fake_binary {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        fn fake_rg(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-rg");
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_exit_one_is_empty_result() {
            let dir = TempDir::new().unwrap();
            let engine = RipgrepEngine::new(fake_rg(dir.path(), "exit 1"));
            let matches = engine.search_content(&repo_at(dir.path()), "foo").await.unwrap();
            assert!(matches.is_empty());
        }

        #[tokio::test]
        async fn test_exit_two_is_search_failed() {
            let dir = TempDir::new().unwrap();
            let engine = RipgrepEngine::new(fake_rg(dir.path(), "echo 'bad regex' >&2\nexit 2"));
            let err = engine.search_content(&repo_at(dir.path()), "(").await.unwrap_err();
            match err {
                CodeBrowserError::SearchFailed { message } => assert!(message.contains("bad regex")),
                other => panic!("unexpected error: {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_streams_json_matches() {
            let dir = TempDir::new().unwrap();
            let script = format!(
                "printf '%s\\n' '{{\"type\":\"begin\",\"data\":{{}}}}' '{}' 'garbage'\nexit 0",
                MATCH_LINE
            );
            let engine = RipgrepEngine::new(fake_rg(dir.path(), &script)).with_max_count(5);
            let matches = engine.search_content(&repo_at(dir.path()), "foo_bar").await.unwrap();
            assert_eq!(matches.len(), 1);
            assert_eq!(matches[0].path, "pkg/a.go");
        }

        /// A zombie counts as exited
        #[cfg(target_os = "linux")]
        fn is_running(pid: &str) -> bool {
            match fs::read_to_string(format!("/proc/{}/stat", pid)) {
                Ok(stat) => stat
                    .rsplit_once(')')
                    .and_then(|(_, rest)| rest.split_whitespace().next())
                    .is_some_and(|state| state != "Z" && state != "X"),
                Err(_) => false,
            }
        }

        #[cfg(target_os = "linux")]
        #[tokio::test]
        async fn test_cancelled_search_kills_rg() {
            let dir = TempDir::new().unwrap();
            let pid_file = dir.path().join("rg.pid");
            let script = format!("echo $$ > '{}'\nexec sleep 30", pid_file.display());
            let engine = RipgrepEngine::new(fake_rg(dir.path(), &script));
            let repo = repo_at(dir.path());

            let outcome = tokio::time::timeout(
                Duration::from_millis(500),
                engine.search_content(&repo, "foo"),
            )
            .await;
            assert!(outcome.is_err(), "search should still be running");

            let pid = fs::read_to_string(&pid_file).unwrap().trim().to_string();
            let mut gone = false;
            for _ in 0..50 {
                if !is_running(&pid) {
                    gone = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            assert!(gone, "rg process {} outlived its search", pid);
        }
    }

    #[tokio::test]
    async fn test_real_rg_search() {
        if which::which("rg").is_err() {
            return; // rg not installed
        }
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/a.go"), "package pkg\n\nfunc FooBar() {}\n").unwrap();
        fs::write(dir.path().join("b.go"), "package main\n\n// calls foobar\n").unwrap();

        let engine = RipgrepEngine::default();
        let repo = repo_at(dir.path());

        let mut matches = engine.search_content(&repo, "foobar").await.unwrap();
        matches.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].path, "b.go");
        assert_eq!(matches[1].path, "pkg/a.go");
        assert_eq!(matches[1].line_num, 3);

        assert!(engine.search_content(&repo, "nothing_here_xyz").await.unwrap().is_empty());

        let files = engine.search_files(&repo, "A.GO").await.unwrap();
        assert_eq!(files, vec!["pkg/a.go"]);
    }
}
