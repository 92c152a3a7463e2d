//! Content version counter file.
//!
//! Auxiliary bookkeeping for hosts that want a build-visible marker of
//! content changes. The file is a tiny CommonJS module:
//!
//! ```text
//! module.exports = {
//!   contentVersion: 42,
//! }
//! ```
//!
//! Failures here never affect notification delivery.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use regex::Regex;

use crate::error::ContentVersionError;

/// First integer following a colon.
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":\s*(\d+)").unwrap());

/// Handle to a content version file.
///
/// Clones share one lock, so bumps through any of them never interleave.
#[derive(Clone, Debug)]
pub struct ContentVersionFile {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl ContentVersionFile {
    /// Create a handle. The file does not need to exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::default(),
        }
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current version. Missing, unreadable or unparsable files count as 0.
    #[must_use]
    pub fn current(&self) -> u64 {
        let _guard = self.lock.lock();
        self.read()
    }

    /// Increment the version and write the file. Returns the new version.
    pub fn bump(&self) -> Result<u64, ContentVersionError> {
        let _guard = self.lock.lock();
        let next = self.read().saturating_add(1);
        self.write(next)?;
        Ok(next)
    }

    fn read(&self) -> u64 {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| parse_version(&content))
            .unwrap_or(0)
    }

    fn write(&self, version: u64) -> Result<(), ContentVersionError> {
        let wrap = |source| ContentVersionError {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(wrap)?;
        }
        std::fs::write(&self.path, render(version)).map_err(wrap)
    }

    /// Bump on the blocking pool. Failures are logged, never returned.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bump_in_background(&self) {
        let file = self.clone();
        tokio::task::spawn_blocking(move || match file.bump() {
            Ok(version) => {
                tracing::debug!(path = %file.path.display(), version, "Content version updated");
            }
            Err(err) => tracing::warn!(error = %err, "Content version update failed"),
        });
    }
}

fn parse_version(content: &str) -> Option<u64> {
    VERSION_RE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn render(version: u64) -> String {
    format!("module.exports = {{\n  contentVersion: {version},\n}}\n")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_missing_file_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let file = ContentVersionFile::new(dir.path().join("content-version.js"));

        assert_eq!(file.current(), 0);
        assert_eq!(file.bump().unwrap(), 1);
        assert_eq!(
            std::fs::read_to_string(file.path()).unwrap(),
            "module.exports = {\n  contentVersion: 1,\n}\n"
        );
    }

    #[test]
    fn test_bump_increments_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content-version.js");
        std::fs::write(&path, "module.exports = {\n  contentVersion: 41,\n}\n").unwrap();
        let file = ContentVersionFile::new(&path);

        assert_eq!(file.bump().unwrap(), 42);
        assert_eq!(file.current(), 42);
    }

    #[test]
    fn test_unparsable_content_resets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content-version.js");
        std::fs::write(&path, "garbage").unwrap();

        assert_eq!(ContentVersionFile::new(&path).bump().unwrap(), 1);
    }

    #[test]
    fn test_bump_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = ContentVersionFile::new(dir.path().join("nested/deeper/version.js"));

        assert_eq!(file.bump().unwrap(), 1);
        assert!(file.path().exists());
    }

    #[test]
    fn test_bump_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be
        let path = dir.path().join("version.js");
        std::fs::create_dir(&path).unwrap();

        let err = ContentVersionFile::new(&path).bump().unwrap_err();

        assert_eq!(err.path, path);
    }

    #[test]
    fn test_concurrent_bumps_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let file = ContentVersionFile::new(dir.path().join("content-version.js"));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let file = file.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        file.bump().unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(file.current(), 80);
    }

    #[test]
    fn test_parse_version_variants() {
        assert_eq!(parse_version("{ contentVersion:7 }"), Some(7));
        assert_eq!(parse_version("contentVersion: 12,"), Some(12));
        assert_eq!(parse_version("no digits"), None);
    }
}
