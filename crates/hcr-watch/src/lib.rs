//! Content directory watcher for hot content reload.
//!
//! Watches a directory recursively and reports debounced batches of content
//! changes to a [`ChangeSink`]. The `hcr` CLI uses it as the producer that
//! drives `ServerHandle::broadcast`.
//!
//! Events for files that already exist when watching starts are not
//! reported; only changes made afterwards are.

mod debouncer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use debouncer::EventDebouncer;
use glob::Pattern;
use notify::{RecursiveMode, Watcher};

/// How often the debouncer is drained.
const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

/// Kind of content change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// File appeared.
    Created,
    /// File content changed.
    Modified,
    /// File disappeared.
    Removed,
}

/// A debounced content change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentChange {
    /// Path relative to the watched directory.
    pub path: PathBuf,
    /// Kind of change.
    pub kind: ChangeKind,
}

/// Receiver of change batches.
///
/// Called from the watcher's drain thread, once per non-empty batch.
pub trait ChangeSink: Send + 'static {
    /// Handle one batch of changes.
    fn content_changed(&self, changes: &[ContentChange]);
}

impl<F> ChangeSink for F
where
    F: Fn(&[ContentChange]) + Send + 'static,
{
    fn content_changed(&self, changes: &[ContentChange]) {
        self(changes);
    }
}

/// Watcher setup errors.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Watched directory does not exist or is not a directory.
    #[error("Watch directory not found: {}", .0.display())]
    DirNotFound(PathBuf),
    /// Invalid glob pattern.
    #[error("Invalid watch pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    /// Backend failure.
    #[error("Failed to watch {}: {source}", path.display())]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// A running watcher. Dropping it stops watching.
pub struct ContentWatcher {
    dir: PathBuf,
    shutdown: Option<mpsc::Sender<()>>,
}

impl ContentWatcher {
    /// Start watching `dir`.
    ///
    /// `patterns` are globs matched against paths relative to `dir`; an empty
    /// list accepts every path. Changes are coalesced per path and delivered
    /// once a path has been quiet for `debounce`.
    pub fn start(
        dir: &Path,
        patterns: &[String],
        debounce: Duration,
        sink: impl ChangeSink,
    ) -> Result<Self, WatchError> {
        if !dir.is_dir() {
            return Err(WatchError::DirNotFound(dir.to_path_buf()));
        }
        // Notify reports canonical paths on some platforms
        let dir = dir
            .canonicalize()
            .map_err(|source| WatchError::Notify {
                path: dir.to_path_buf(),
                source: notify::Error::io(source),
            })?;
        let patterns = compile_patterns(patterns)?;
        let debouncer = Arc::new(EventDebouncer::new(debounce));

        let mut watcher = {
            let dir = dir.clone();
            let debouncer = Arc::clone(&debouncer);
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => record_event(&dir, &patterns, &debouncer, event),
                Err(err) => tracing::warn!(error = %err, "Watch backend error"),
            })
        }
        .map_err(|source| WatchError::Notify {
            path: dir.clone(),
            source,
        })?;

        watcher
            .watch(&dir, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Notify {
                path: dir.clone(),
                source,
            })?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let drain_dir = dir.clone();
        std::thread::spawn(move || {
            // Watching stops when this thread drops the watcher
            let _watcher = watcher;
            loop {
                match shutdown_rx.recv_timeout(DRAIN_INTERVAL) {
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                }
                let changes = relative_changes(&drain_dir, debouncer.drain_ready());
                if !changes.is_empty() {
                    tracing::info!(count = changes.len(), "Content changed");
                    for change in &changes {
                        tracing::debug!(path = %change.path.display(), kind = ?change.kind, "Change");
                    }
                    sink.content_changed(&changes);
                }
            }
            tracing::debug!(dir = %drain_dir.display(), "Content watcher stopped");
        });

        tracing::info!(dir = %dir.display(), "Watching content");
        Ok(Self {
            dir,
            shutdown: Some(shutdown_tx),
        })
    }

    /// Canonical path of the watched directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stop watching.
    pub fn stop(mut self) {
        self.shutdown.take();
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, WatchError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|source| WatchError::Pattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

fn record_event(dir: &Path, patterns: &[Pattern], debouncer: &EventDebouncer, event: notify::Event) {
    let kind = match event.kind {
        notify::EventKind::Create(_) => ChangeKind::Created,
        notify::EventKind::Modify(_) => ChangeKind::Modified,
        notify::EventKind::Remove(_) => ChangeKind::Removed,
        _ => return,
    };

    for path in event.paths {
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        if matches_patterns(patterns, relative) {
            debouncer.record(path, kind);
        }
    }
}

fn matches_patterns(patterns: &[Pattern], relative: &Path) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| p.matches_path(relative))
}

fn relative_changes(dir: &Path, ready: Vec<(PathBuf, ChangeKind)>) -> Vec<ContentChange> {
    ready
        .into_iter()
        .filter_map(|(path, kind)| {
            let path = path.strip_prefix(dir).ok()?.to_path_buf();
            Some(ContentChange { path, kind })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Instant;

    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;

    type Batches = Arc<Mutex<Vec<Vec<ContentChange>>>>;

    fn recording_sink() -> (Batches, impl ChangeSink) {
        let batches: Batches = Arc::default();
        let sink = {
            let batches = Arc::clone(&batches);
            move |changes: &[ContentChange]| batches.lock().push(changes.to_vec())
        };
        (batches, sink)
    }

    fn wait_for(batches: &Batches, mut check: impl FnMut(&[Vec<ContentChange>]) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if check(&batches.lock()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    fn all_paths(batches: &[Vec<ContentChange>]) -> Vec<PathBuf> {
        batches.iter().flatten().map(|c| c.path.clone()).collect()
    }

    #[test]
    fn test_missing_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        let result = ContentWatcher::start(&missing, &[], Duration::from_millis(10), |_: &[ContentChange]| {});

        assert!(matches!(result, Err(WatchError::DirNotFound(path)) if path == missing));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let result = ContentWatcher::start(
            dir.path(),
            &["[".to_owned()],
            Duration::from_millis(10),
            |_: &[ContentChange]| {},
        );

        assert!(matches!(result, Err(WatchError::Pattern { pattern, .. }) if pattern == "["));
    }

    #[test]
    fn test_matches_patterns() {
        let patterns = compile_patterns(&["**/*.md".to_owned(), "data/*.json".to_owned()]).unwrap();

        assert!(matches_patterns(&patterns, Path::new("post.md")));
        assert!(matches_patterns(&patterns, Path::new("blog/2024/post.md")));
        assert!(matches_patterns(&patterns, Path::new("data/authors.json")));
        assert!(!matches_patterns(&patterns, Path::new("data/nested/authors.json")));
        assert!(!matches_patterns(&patterns, Path::new("image.png")));
        assert!(matches_patterns(&[], Path::new("anything")));
    }

    #[test]
    fn test_relative_changes_strip_dir() {
        let changes = relative_changes(
            Path::new("/site/content"),
            vec![
                (PathBuf::from("/site/content/a.md"), ChangeKind::Created),
                (PathBuf::from("/elsewhere/b.md"), ChangeKind::Modified),
            ],
        );

        assert_eq!(
            changes,
            vec![ContentChange {
                path: PathBuf::from("a.md"),
                kind: ChangeKind::Created,
            }]
        );
    }

    #[test]
    fn test_reports_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let (batches, sink) = recording_sink();
        let _watcher = ContentWatcher::start(dir.path(), &[], Duration::from_millis(50), sink).unwrap();
        std::thread::sleep(Duration::from_millis(200));

        fs::write(dir.path().join("post.md"), "# Hello").unwrap();

        assert!(wait_for(&batches, |b| all_paths(b).contains(&PathBuf::from("post.md"))));
    }

    #[test]
    fn test_existing_files_are_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.md"), "# Old").unwrap();
        let (batches, sink) = recording_sink();

        let _watcher = ContentWatcher::start(dir.path(), &[], Duration::from_millis(20), sink).unwrap();
        std::thread::sleep(Duration::from_millis(300));

        assert!(batches.lock().is_empty());
    }

    #[test]
    fn test_patterns_filter_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (batches, sink) = recording_sink();
        let _watcher = ContentWatcher::start(
            dir.path(),
            &["**/*.md".to_owned()],
            Duration::from_millis(50),
            sink,
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(200));

        fs::write(dir.path().join("ignored.txt"), "x").unwrap();
        fs::write(dir.path().join("kept.md"), "x").unwrap();

        assert!(wait_for(&batches, |b| all_paths(b).contains(&PathBuf::from("kept.md"))));
        assert!(!all_paths(&batches.lock()).contains(&PathBuf::from("ignored.txt")));
    }

    #[test]
    fn test_stop_ends_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let (batches, sink) = recording_sink();
        let watcher = ContentWatcher::start(dir.path(), &[], Duration::from_millis(20), sink).unwrap();
        std::thread::sleep(Duration::from_millis(200));

        watcher.stop();
        std::thread::sleep(Duration::from_millis(200));
        fs::write(dir.path().join("late.md"), "x").unwrap();
        std::thread::sleep(Duration::from_millis(300));

        assert!(batches.lock().is_empty());
    }
}
