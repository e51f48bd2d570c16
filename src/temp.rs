//! Temporary Resource Manager: one scratch arena per processing run.
//!
//! ## Why a session arena?
//!
//! Two CLI invocations running at once must never write into each other's
//! scratch files. Every path a [`TempSession`] hands out lives under
//! `<root>/<session id>/`, where the id combines a millisecond timestamp with
//! a random suffix, so isolation needs no locking. Tracking every allocated
//! path lets [`TempSession::cleanup`] remove exactly what the run created,
//! and [`TempSession::purge_stale`] sweeps sessions left behind by crashed
//! runs.
//!
//! Cleanup never fails: removal errors are logged and collected in the
//! [`CleanupReport`]. If a session is dropped without `cleanup()` having run,
//! `Drop` removes whatever is still tracked.

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Prefix shared by every session directory name.
pub const SESSION_PREFIX: &str = "session_";

/// Default age after which [`TempSession::purge_stale`] removes a session.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Root for sessions when none is configured: `<system temp>/markdownforge`.
pub fn default_root() -> PathBuf {
    std::env::temp_dir().join("markdownforge")
}

/// What a call to [`TempSession::cleanup`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub directories_removed: usize,
    /// One line per path that could not be removed.
    pub failures: Vec<String>,
}

/// Snapshot returned by [`TempSession::session_info`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub session_dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub exists: bool,
    /// Combined size of the tracked files that still exist.
    pub total_size: u64,
}

/// Scratch-space owner for one processing run.
///
/// Not `Clone`: exactly one run owns a session.
#[derive(Debug)]
pub struct TempSession {
    id: String,
    dir: PathBuf,
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
    counter: u32,
}

impl TempSession {
    /// Create a session under [`default_root`]. Nothing touches the disk
    /// until the first allocation.
    pub fn new() -> Self {
        Self::new_in(default_root())
    }

    /// Create a session under `root`.
    pub fn new_in(root: impl Into<PathBuf>) -> Self {
        let id = generate_session_id();
        let dir = root.into().join(&id);
        Self {
            id,
            dir,
            files: Vec::new(),
            dirs: Vec::new(),
            counter: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `<root>/<session id>`.
    pub fn session_dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    // ── Allocation ───────────────────────────────────────────────────────

    /// Create and track a fresh directory `<session>/<prefix>_<ms>_<n>`.
    pub async fn create_dir(&mut self, prefix: &str) -> io::Result<PathBuf> {
        self.counter += 1;
        let path = self
            .dir
            .join(format!("{}_{}_{}", prefix, now_millis(), self.counter));
        tokio::fs::create_dir_all(&path).await?;
        debug!("Created temp directory: {}", path.display());
        track(&mut self.dirs, path.clone());
        Ok(path)
    }

    /// Write `content` to `<new dir>/<prefix>_<ms>.<extension>` and track it.
    pub async fn create_file(
        &mut self,
        content: impl AsRef<[u8]>,
        extension: &str,
        prefix: &str,
    ) -> io::Result<PathBuf> {
        let dir = self.create_dir("temp").await?;
        let path = dir.join(format!(
            "{}_{}.{}",
            prefix,
            now_millis(),
            extension.trim_start_matches('.')
        ));
        tokio::fs::write(&path, content).await?;
        debug!("Created temp file: {}", path.display());
        track(&mut self.files, path.clone());
        Ok(path)
    }

    /// Copy `source` into a fresh directory as `<stem>_copy.<ext>`.
    pub async fn copy_to_temp(&mut self, source: &Path) -> io::Result<PathBuf> {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let name = match source.extension() {
            Some(ext) => format!("{}_copy.{}", stem, ext.to_string_lossy()),
            None => format!("{stem}_copy"),
        };
        let dir = self.create_dir("temp").await?;
        let path = dir.join(name);
        tokio::fs::copy(source, &path).await?;
        debug!("Copied to temp: {} -> {}", source.display(), path.display());
        track(&mut self.files, path.clone());
        Ok(path)
    }

    /// A path named `name` inside a fresh tracked directory. The file itself
    /// is not created.
    pub async fn temp_path(&mut self, name: &str) -> io::Result<PathBuf> {
        Ok(self.create_dir("temp").await?.join(name))
    }

    /// Track a path created by someone else so cleanup removes it too.
    pub fn register_external(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!("Registered external temp path: {}", path.display());
        if path.is_dir() {
            track(&mut self.dirs, path);
        } else {
            track(&mut self.files, path);
        }
    }

    /// True if `path` is a tracked file or lies under a tracked directory.
    pub fn is_managed(&self, path: &Path) -> bool {
        self.files.iter().any(|f| f == path) || self.dirs.iter().any(|d| path.starts_with(d))
    }

    // ── Release ──────────────────────────────────────────────────────────

    /// Remove every tracked path, then the session directory if it is empty.
    ///
    /// Paths already gone are skipped and not counted, so a second call
    /// reports zero removals. Errors are logged and collected, never raised.
    pub async fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for path in std::mem::take(&mut self.files) {
            match remove_path(&path).await {
                Ok(true) => {
                    report.files_removed += 1;
                    debug!("Removed temp file: {}", path.display());
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to remove temp file {}: {}", path.display(), e);
                    report.failures.push(format!("{}: {}", path.display(), e));
                }
            }
        }

        for path in std::mem::take(&mut self.dirs) {
            match remove_path(&path).await {
                Ok(true) => {
                    report.directories_removed += 1;
                    debug!("Removed temp directory: {}", path.display());
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to remove temp directory {}: {}", path.display(), e);
                    report.failures.push(format!("{}: {}", path.display(), e));
                }
            }
        }

        // Only an empty session dir is removed; anything else in it was not ours.
        if tokio::fs::remove_dir(&self.dir).await.is_ok() {
            debug!("Removed empty session directory: {}", self.dir.display());
        }

        if report.files_removed > 0 || report.directories_removed > 0 {
            debug!(
                "Cleanup completed: {} files, {} directories",
                report.files_removed, report.directories_removed
            );
        }
        report
    }

    /// Describe the session and the size of its tracked files.
    pub async fn session_info(&self) -> SessionInfo {
        let exists = tokio::fs::try_exists(&self.dir).await.unwrap_or(false);
        let mut total_size = 0;
        for file in &self.files {
            if let Ok(meta) = tokio::fs::metadata(file).await {
                total_size += meta.len();
            }
        }
        SessionInfo {
            session_id: self.id.clone(),
            session_dir: self.dir.clone(),
            files: self.files.clone(),
            directories: self.dirs.clone(),
            exists,
            total_size,
        }
    }

    /// Remove `session_*` directories under `root` whose mtime is older
    /// than `max_age`. Returns how many were removed.
    ///
    /// Independent of any live session; a missing root is not an error.
    pub async fn purge_stale(root: &Path, max_age: Duration) -> usize {
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!("Failed to scan temp root {}: {}", root.display(), e);
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(SESSION_PREFIX) {
                continue;
            }
            let path = entry.path();
            let age = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => now.duration_since(modified).unwrap_or_default(),
                Err(e) => {
                    debug!("Failed to stat session {}: {}", path.display(), e);
                    continue;
                }
            };
            if age > max_age {
                match tokio::fs::remove_dir_all(&path).await {
                    Ok(()) => {
                        removed += 1;
                        debug!("Removed old session: {}", path.display());
                    }
                    Err(e) => debug!("Failed to remove session {}: {}", path.display(), e),
                }
            }
        }

        if removed > 0 {
            info!("Cleaned up {} old session(s)", removed);
        }
        removed
    }
}

impl Default for TempSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TempSession {
    fn drop(&mut self) {
        for file in self.files.drain(..) {
            let _ = std::fs::remove_file(&file);
        }
        for dir in self.dirs.drain(..) {
            let _ = std::fs::remove_dir_all(&dir);
        }
        let _ = std::fs::remove_dir(&self.dir);
    }
}

fn track(set: &mut Vec<PathBuf>, path: PathBuf) {
    if !set.contains(&path) {
        set.push(path);
    }
}

/// `Ok(true)` if something was removed, `Ok(false)` if the path was already gone.
async fn remove_path(path: &Path) -> io::Result<bool> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let result = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// `session_<ms>_<9 random lowercase alphanumerics>`.
fn generate_session_id() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}_{}", SESSION_PREFIX, now_millis(), &random[..9])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn session_id_shape() {
        let s = TempSession::new_in("/nonexistent");
        let parts: Vec<&str> = s.id().split('_').collect();
        assert_eq!(parts.len(), 3, "{}", s.id());
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<u128>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert_ne!(s.id(), TempSession::new_in("/nonexistent").id());
    }

    #[test]
    fn new_session_touches_nothing() {
        let root = TempDir::new().unwrap();
        let s = TempSession::new_in(root.path());
        assert!(!s.session_dir().exists());
        assert_eq!(s.file_count() + s.dir_count(), 0);
    }

    #[tokio::test]
    async fn create_dir_is_namespaced_and_unique() {
        let root = TempDir::new().unwrap();
        let mut s = TempSession::new_in(root.path());
        let a = s.create_dir("diagrams").await.unwrap();
        let b = s.create_dir("diagrams").await.unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with(s.session_dir()));
        assert!(a.is_dir() && b.is_dir());
        assert!(a
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("diagrams_"));
        assert_eq!(s.dir_count(), 2);
    }

    #[tokio::test]
    async fn create_file_writes_content() {
        let root = TempDir::new().unwrap();
        let mut s = TempSession::new_in(root.path());
        let f = s.create_file("# hi", ".md", "processed").await.unwrap();
        assert_eq!(std::fs::read_to_string(&f).unwrap(), "# hi");
        assert_eq!(f.extension().unwrap(), "md");
        assert!(f.file_name().unwrap().to_string_lossy().starts_with("processed_"));
        assert!(s.is_managed(&f));
        assert_eq!(s.file_count(), 1);
    }

    #[tokio::test]
    async fn cleanup_removes_everything_and_is_idempotent() {
        let root = TempDir::new().unwrap();
        let mut s = TempSession::new_in(root.path());
        s.create_dir("a").await.unwrap();
        s.create_file(b"x".to_vec(), "bin", "blob").await.unwrap();

        let first = s.cleanup().await;
        assert_eq!(first.files_removed, 1);
        // "a" plus the directory holding the file
        assert_eq!(first.directories_removed, 2);
        assert!(first.failures.is_empty());
        assert!(!s.session_dir().exists());

        let second = s.cleanup().await;
        assert_eq!(second, CleanupReport::default());
    }

    #[tokio::test]
    async fn cleanup_tolerates_externally_removed_paths() {
        let root = TempDir::new().unwrap();
        let mut s = TempSession::new_in(root.path());
        let d = s.create_dir("gone").await.unwrap();
        let kept = s.create_dir("kept").await.unwrap();
        std::fs::remove_dir_all(&d).unwrap();

        let report = s.cleanup().await;
        assert_eq!(report.directories_removed, 1);
        assert!(report.failures.is_empty());
        assert!(!kept.exists());
    }

    #[tokio::test]
    async fn cleanup_with_nothing_tracked() {
        let root = TempDir::new().unwrap();
        let mut s = TempSession::new_in(root.path());
        assert_eq!(s.cleanup().await, CleanupReport::default());
    }

    #[tokio::test]
    async fn register_external_and_is_managed() {
        let root = TempDir::new().unwrap();
        let mut s = TempSession::new_in(root.path());
        let ext_dir = root.path().join("external");
        std::fs::create_dir(&ext_dir).unwrap();
        std::fs::write(ext_dir.join("inner.txt"), "x").unwrap();
        let ext_file = root.path().join("loose.txt");
        std::fs::write(&ext_file, "y").unwrap();

        s.register_external(&ext_dir);
        s.register_external(&ext_file);
        assert!(s.is_managed(&ext_dir.join("inner.txt")));
        assert!(s.is_managed(&ext_file));
        assert!(!s.is_managed(&root.path().join("other.txt")));

        let report = s.cleanup().await;
        assert_eq!(report.files_removed, 1);
        assert_eq!(report.directories_removed, 1);
        assert!(!ext_dir.exists() && !ext_file.exists());
    }

    #[tokio::test]
    async fn copy_to_temp_and_session_info() {
        let root = TempDir::new().unwrap();
        let src = root.path().join("notes.md");
        std::fs::write(&src, "12345").unwrap();

        let mut s = TempSession::new_in(root.path().join("tmp"));
        let copy = s.copy_to_temp(&src).await.unwrap();
        assert_eq!(copy.file_name().unwrap(), "notes_copy.md");
        assert_eq!(std::fs::read_to_string(&copy).unwrap(), "12345");

        let named = s.temp_path("page.html").await.unwrap();
        assert!(named.parent().unwrap().is_dir());
        assert!(!named.exists());

        let info = s.session_info().await;
        assert!(info.exists);
        assert_eq!(info.total_size, 5);
        assert_eq!(info.files, vec![copy]);
        assert_eq!(info.directories.len(), 2);
    }

    #[tokio::test]
    async fn drop_removes_tracked_paths() {
        let root = TempDir::new().unwrap();
        let session_dir;
        let dir;
        {
            let mut s = TempSession::new_in(root.path());
            dir = s.create_dir("x").await.unwrap();
            session_dir = s.session_dir().to_path_buf();
        }
        assert!(!dir.exists());
        assert!(!session_dir.exists());
    }

    #[tokio::test]
    async fn purge_stale_only_touches_old_sessions() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("session_1_abcdefghi")).unwrap();
        std::fs::create_dir(root.path().join("unrelated")).unwrap();

        assert_eq!(TempSession::purge_stale(root.path(), DEFAULT_MAX_AGE).await, 0);
        assert!(root.path().join("session_1_abcdefghi").exists());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            TempSession::purge_stale(root.path(), Duration::from_millis(1)).await,
            1
        );
        assert!(!root.path().join("session_1_abcdefghi").exists());
        assert!(root.path().join("unrelated").exists());
    }

    #[tokio::test]
    async fn purge_stale_missing_root() {
        let root = TempDir::new().unwrap();
        assert_eq!(
            TempSession::purge_stale(&root.path().join("missing"), DEFAULT_MAX_AGE).await,
            0
        );
    }
}
