//! Repository registry
//!
//! Repositories are persisted in SQLite under the global data directory and
//! mirrored into an in-memory snapshot that serves every read. The snapshot
//! is rebuilt after each mutation.
//!
//! ```text
//! <data_dir>/
//!   app.db
//!   repos/<id>/scip/index.scip
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, ErrorCode};
use serde::Serialize;

use crate::error::{CodeBrowserError, Result};
use crate::git;

const DB_FILE_NAME: &str = "app.db";
const REPOS_SUB_DIR: &str = "repos";
const SCIP_SUB_DIR: &str = "scip";
const SCIP_FILE_NAME: &str = "index.scip";

/// A registered repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoRef {
    pub repo_id: u32,
    pub name: String,
    pub source_path: PathBuf,
    pub data_path: PathBuf,
}

impl RepoRef {
    /// `<data_path>/scip/index.scip`
    pub fn index_path(&self) -> PathBuf {
        self.data_path.join(SCIP_SUB_DIR).join(SCIP_FILE_NAME)
    }
}

/// What the code intelligence layer needs from the registry
#[async_trait]
pub trait RepoRegistry: Send + Sync {
    /// Look up a repository by its external (decimal) identifier
    fn resolve(&self, repo_id: &str) -> Option<RepoRef>;

    /// All repositories, sorted by name
    fn list(&self) -> Vec<RepoRef>;

    fn index_path_of(&self, repo: &RepoRef) -> PathBuf {
        repo.index_path()
    }

    /// Raw bytes of a file relative to the repository root
    async fn read_blob(&self, repo: &RepoRef, relative_path: &str) -> Result<Vec<u8>>;
}

/// Parse an external repository identifier
pub fn parse_repo_id(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|&id| id != 0)
}

#[derive(Default)]
struct Snapshot {
    repos: Vec<RepoRef>,
    by_id: HashMap<u32, RepoRef>,
}

/// SQLite-backed registry
pub struct SqliteRegistry {
    conn: Mutex<Connection>,
    data_dir: PathBuf,
    snapshot: RwLock<Snapshot>,
}

impl SqliteRegistry {
    /// Open (or create) the registry under `data_dir`
    pub fn open(data_dir: &Path) -> Result<Self> {
        let data_dir = std::path::absolute(data_dir)?;
        fs::create_dir_all(data_dir.join(REPOS_SUB_DIR))?;

        let db_path = data_dir.join(DB_FILE_NAME);
        tracing::info!("Opening registry database {}", db_path.display());
        let conn = Connection::open(&db_path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        create_schema(&conn)?;

        let registry = Self {
            conn: Mutex::new(conn),
            data_dir,
            snapshot: RwLock::new(Snapshot::default()),
        };
        registry.reload()?;
        tracing::info!("Loaded {} repositories", registry.count());
        Ok(registry)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn get(&self, repo_id: u32) -> Option<RepoRef> {
        self.snapshot.read().by_id.get(&repo_id).cloned()
    }

    pub fn count(&self) -> usize {
        self.snapshot.read().repos.len()
    }

    /// Register a repository whose sources live at `source_path`
    pub fn add(&self, repo_id: u32, name: &str, source_path: &Path) -> Result<RepoRef> {
        if repo_id == 0 {
            return Err(CodeBrowserError::bad_request("Repository id must not be 0"));
        }
        if name.trim().is_empty() {
            return Err(CodeBrowserError::bad_request("Repository name must not be empty"));
        }

        let source_path = std::path::absolute(source_path)?;
        if !source_path.is_dir() {
            return Err(CodeBrowserError::bad_request(format!(
                "Source path {} is not a directory",
                source_path.display()
            )));
        }

        let data_path = self.data_dir.join(REPOS_SUB_DIR).join(repo_id.to_string());
        fs::create_dir_all(&data_path)?;

        let inserted = self.conn.lock().execute(
            "INSERT INTO repositories (repo_id, name, source_path, data_path) VALUES (?1, ?2, ?3, ?4)",
            params![
                repo_id,
                name,
                source_path.to_string_lossy(),
                data_path.to_string_lossy()
            ],
        );
        if let Err(e) = inserted {
            if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
                return Err(CodeBrowserError::bad_request(format!(
                    "Repository id {} already exists",
                    repo_id
                )));
            }
            return Err(e.into());
        }

        tracing::info!("Added repository {} ({})", repo_id, name);
        self.reload()?;
        self.get(repo_id).ok_or_else(|| CodeBrowserError::Registry {
            message: format!("Repository {} vanished after insert", repo_id),
        })
    }

    /// Remove a repository and its data directory
    pub fn remove(&self, repo_id: u32) -> Result<()> {
        let repo = self.get(repo_id).ok_or_else(|| CodeBrowserError::NotFound {
            repo_id: repo_id.to_string(),
        })?;

        let affected = self
            .conn
            .lock()
            .execute("DELETE FROM repositories WHERE repo_id = ?1", params![repo_id])?;
        if affected == 0 {
            self.reload()?;
            return Err(CodeBrowserError::NotFound {
                repo_id: repo_id.to_string(),
            });
        }

        if let Err(e) = fs::remove_dir_all(&repo.data_path) {
            tracing::warn!(
                "Failed to remove data directory {} for repository {}: {}",
                repo.data_path.display(),
                repo_id,
                e
            );
        }

        tracing::info!("Removed repository {}", repo_id);
        self.reload()
    }

    /// Install an externally produced SCIP index for a repository
    ///
    /// The file is copied to a temporary name first and renamed into place,
    /// so readers never observe a half-written index.
    pub fn register_scip(&self, repo_id: u32, scip_file: &Path) -> Result<PathBuf> {
        let repo = self.get(repo_id).ok_or_else(|| CodeBrowserError::NotFound {
            repo_id: repo_id.to_string(),
        })?;
        if !scip_file.is_file() {
            return Err(CodeBrowserError::bad_request(format!(
                "SCIP file {} does not exist",
                scip_file.display()
            )));
        }

        let target = repo.index_path();
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let staging = target.with_extension("scip.tmp");
        fs::copy(scip_file, &staging)?;
        fs::rename(&staging, &target)?;

        tracing::info!(
            "Registered SCIP index for repository {} at {}",
            repo_id,
            target.display()
        );
        Ok(target)
    }

    /// Rebuild the in-memory snapshot from the database
    pub fn reload(&self) -> Result<()> {
        let repos = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT repo_id, name, source_path, data_path FROM repositories ORDER BY name",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(RepoRef {
                    repo_id: row.get(0)?,
                    name: row.get(1)?,
                    source_path: PathBuf::from(row.get::<_, String>(2)?),
                    data_path: PathBuf::from(row.get::<_, String>(3)?),
                })
            })?;

            let mut repos = Vec::new();
            for row in rows {
                match row {
                    Ok(repo) => repos.push(repo),
                    Err(e) => tracing::warn!("Skipping unreadable repository row: {}", e),
                }
            }
            repos
        };

        let by_id = repos.iter().map(|r| (r.repo_id, r.clone())).collect();
        *self.snapshot.write() = Snapshot { repos, by_id };
        Ok(())
    }
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repo_id INTEGER UNIQUE NOT NULL,
            name TEXT NOT NULL,
            source_path TEXT NOT NULL,
            data_path TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TRIGGER IF NOT EXISTS update_repo_updated_at
        AFTER UPDATE ON repositories FOR EACH ROW
        BEGIN
            UPDATE repositories SET updated_at = CURRENT_TIMESTAMP WHERE id = OLD.id;
        END;
        "#,
    )?;
    Ok(())
}

/// Reject absolute paths and anything that climbs out of the repository
pub fn validate_relative_path(relative_path: &str) -> Result<&Path> {
    let path = Path::new(relative_path);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative_path.is_empty() || escapes {
        return Err(CodeBrowserError::SourceUnavailable {
            path: relative_path.to_string(),
            message: "path must be relative to the repository root".to_string(),
        });
    }
    Ok(path)
}

/// Read a file from `HEAD` when the source tree is a git repository,
/// otherwise (or when the file is not committed) from disk
pub fn read_source_file(source_path: &Path, relative_path: &str) -> Result<Vec<u8>> {
    let rel = validate_relative_path(relative_path)?;

    if git::is_git_repo(source_path) {
        match git::show_blob("HEAD", relative_path, source_path) {
            Ok(content) => return Ok(content),
            Err(e) => tracing::debug!("Falling back to working tree for {}: {}", relative_path, e),
        }
    }

    let full_path = source_path.join(rel);
    if full_path.is_dir() {
        return Err(CodeBrowserError::SourceUnavailable {
            path: relative_path.to_string(),
            message: "path is a directory".to_string(),
        });
    }
    fs::read(&full_path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CodeBrowserError::PathNotFound {
            path: relative_path.to_string(),
        },
        _ => CodeBrowserError::SourceUnavailable {
            path: relative_path.to_string(),
            message: e.to_string(),
        },
    })
}

#[async_trait]
impl RepoRegistry for SqliteRegistry {
    fn resolve(&self, repo_id: &str) -> Option<RepoRef> {
        parse_repo_id(repo_id).and_then(|id| self.get(id))
    }

    fn list(&self) -> Vec<RepoRef> {
        self.snapshot.read().repos.clone()
    }

    async fn read_blob(&self, repo: &RepoRef, relative_path: &str) -> Result<Vec<u8>> {
        let source_path = repo.source_path.clone();
        let relative_path = relative_path.to_string();
        tokio::task::spawn_blocking(move || read_source_file(&source_path, &relative_path))
            .await
            .map_err(|e| CodeBrowserError::Io(std::io::Error::other(e.to_string())))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TempDir, SqliteRegistry) {
        let data = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let registry = SqliteRegistry::open(data.path()).unwrap();
        (data, src, registry)
    }

    #[test]
    fn test_add_resolve_and_list() {
        let (data, src, registry) = setup();
        let repo = registry.add(42, "zeta", src.path()).unwrap();
        registry.add(7, "alpha", src.path()).unwrap();

        assert_eq!(repo.repo_id, 42);
        assert!(repo.data_path.starts_with(std::path::absolute(data.path()).unwrap()));
        assert!(repo.data_path.is_dir());
        assert_eq!(
            registry.index_path_of(&repo),
            repo.data_path.join("scip").join("index.scip")
        );

        assert_eq!(registry.resolve("42"), Some(repo.clone()));
        assert_eq!(registry.resolve(" 42 "), Some(repo));
        assert_eq!(registry.resolve("nope"), None);
        assert_eq!(registry.resolve("0"), None);
        assert_eq!(registry.resolve("99"), None);

        let names: Vec<_> = registry.list().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_add_validation() {
        let (_data, src, registry) = setup();
        assert!(registry.add(0, "x", src.path()).is_err());
        assert!(registry.add(1, "  ", src.path()).is_err());
        assert!(registry.add(1, "x", &src.path().join("missing")).is_err());

        registry.add(1, "x", src.path()).unwrap();
        let dup = registry.add(1, "y", src.path()).unwrap_err();
        assert!(matches!(dup, CodeBrowserError::BadRequest { .. }));
    }

    #[test]
    fn test_persists_across_reopen() {
        let (data, src, registry) = setup();
        registry.add(3, "kept", src.path()).unwrap();
        drop(registry);

        let reopened = SqliteRegistry::open(data.path()).unwrap();
        assert_eq!(reopened.count(), 1);
        assert_eq!(reopened.get(3).unwrap().name, "kept");
    }

    #[test]
    fn test_remove_deletes_data_dir() {
        let (_data, src, registry) = setup();
        let repo = registry.add(5, "gone", src.path()).unwrap();
        registry.remove(5).unwrap();

        assert!(registry.get(5).is_none());
        assert!(!repo.data_path.exists());
        assert!(matches!(
            registry.remove(5),
            Err(CodeBrowserError::NotFound { .. })
        ));
    }

    #[test]
    fn test_register_scip_copies_into_place() {
        let (_data, src, registry) = setup();
        let repo = registry.add(9, "scip", src.path()).unwrap();
        let produced = src.path().join("index.scip");
        fs::write(&produced, b"\x12\x00").unwrap();

        let target = registry.register_scip(9, &produced).unwrap();
        assert_eq!(target, repo.index_path());
        assert_eq!(fs::read(&target).unwrap(), b"\x12\x00");
        assert!(registry.register_scip(10, &produced).is_err());
    }

    #[test]
    fn test_read_source_file_rejects_escapes() {
        let src = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("pkg")).unwrap();
        fs::write(src.path().join("pkg/d.go"), "line0\n  foo_bar()\n").unwrap();

        assert_eq!(
            read_source_file(src.path(), "pkg/d.go").unwrap(),
            b"line0\n  foo_bar()\n"
        );
        for bad in ["", "../etc/passwd", "/etc/passwd", "pkg/../../x"] {
            assert!(
                matches!(
                    read_source_file(src.path(), bad),
                    Err(CodeBrowserError::SourceUnavailable { .. })
                ),
                "{} should be rejected",
                bad
            );
        }
        assert!(read_source_file(src.path(), "pkg").is_err());
        assert!(matches!(
            read_source_file(src.path(), "missing.go"),
            Err(CodeBrowserError::PathNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_blob_through_trait() {
        let (_data, src, registry) = setup();
        fs::write(src.path().join("a.go"), "package a\n").unwrap();
        let repo = registry.add(11, "blob", src.path()).unwrap();

        let registry: Arc<dyn RepoRegistry> = Arc::new(registry);
        let content = registry.read_blob(&repo, "a.go").await.unwrap();
        assert_eq!(content, b"package a\n");
    }
}
