//! Per-path coalescing of raw filesystem events.
//!
//! Editors emit several events per save (truncate, write, rename, chmod).
//! The debouncer folds them into one change per path and releases it once
//! the path has been quiet for the debounce window.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::ChangeKind;

struct Pending {
    kind: ChangeKind,
    deadline: Instant,
}

/// Thread-safe event debouncer.
pub(crate) struct EventDebouncer {
    pending: Mutex<HashMap<PathBuf, Pending>>,
    window: Duration,
}

impl EventDebouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Record a raw event. Called from the notify callback thread.
    pub(crate) fn record(&self, path: PathBuf, kind: ChangeKind) {
        let mut pending = self.pending.lock();
        let deadline = Instant::now() + self.window;

        match pending.entry(path) {
            Entry::Vacant(entry) => {
                entry.insert(Pending { kind, deadline });
            }
            Entry::Occupied(mut entry) => match coalesce(entry.get().kind, kind) {
                Some(kind) => {
                    *entry.get_mut() = Pending { kind, deadline };
                }
                // Created then removed inside one window: nothing happened
                None => {
                    entry.remove();
                }
            },
        }
    }

    /// Remove and return every change whose window has elapsed, sorted by
    /// path.
    pub(crate) fn drain_ready(&self) -> Vec<(PathBuf, ChangeKind)> {
        let now = Instant::now();
        let mut ready = Vec::new();

        self.pending.lock().retain(|path, event| {
            if event.deadline <= now {
                ready.push((path.clone(), event.kind));
                false
            } else {
                true
            }
        });

        ready.sort_by(|a, b| a.0.cmp(&b.0));
        ready
    }

    #[cfg(test)]
    pub(crate) fn is_idle(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[allow(clippy::match_same_arms)]
fn coalesce(existing: ChangeKind, new: ChangeKind) -> Option<ChangeKind> {
    use ChangeKind::{Created, Modified, Removed};

    match (existing, new) {
        (Created, Created | Modified) => Some(Created),
        (Created, Removed) => None,

        (Modified, Created) => Some(Created),
        (Modified, Modified) => Some(Modified),
        (Modified, Removed) => Some(Removed),

        // Replaced
        (Removed, Created) => Some(Modified),
        (Removed, Modified | Removed) => Some(Removed),
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use pretty_assertions::assert_eq;

    use super::*;

    const WINDOW: Duration = Duration::from_millis(10);
    const PAST_WINDOW: Duration = Duration::from_millis(20);

    #[test]
    fn test_change_released_after_window() {
        let debouncer = EventDebouncer::new(WINDOW);
        let path = PathBuf::from("/content/post.md");

        debouncer.record(path.clone(), ChangeKind::Modified);
        assert!(debouncer.drain_ready().is_empty());

        thread::sleep(PAST_WINDOW);

        assert_eq!(debouncer.drain_ready(), vec![(path, ChangeKind::Modified)]);
        assert!(debouncer.drain_ready().is_empty());
        assert!(debouncer.is_idle());
    }

    #[test]
    fn test_editor_save_burst_is_one_change() {
        let debouncer = EventDebouncer::new(WINDOW);
        let path = PathBuf::from("/content/post.md");

        for _ in 0..4 {
            debouncer.record(path.clone(), ChangeKind::Modified);
        }
        thread::sleep(PAST_WINDOW);

        assert_eq!(debouncer.drain_ready().len(), 1);
    }

    #[test]
    fn test_new_event_extends_deadline() {
        let debouncer = EventDebouncer::new(Duration::from_millis(50));
        let path = PathBuf::from("/content/post.md");

        debouncer.record(path.clone(), ChangeKind::Modified);
        thread::sleep(Duration::from_millis(30));
        debouncer.record(path, ChangeKind::Modified);
        thread::sleep(Duration::from_millis(30));

        assert!(debouncer.drain_ready().is_empty());
    }

    #[test]
    fn test_created_then_removed_vanishes() {
        let debouncer = EventDebouncer::new(WINDOW);
        let path = PathBuf::from("/content/draft.md");

        debouncer.record(path.clone(), ChangeKind::Created);
        debouncer.record(path, ChangeKind::Removed);
        thread::sleep(PAST_WINDOW);

        assert!(debouncer.drain_ready().is_empty());
        assert!(debouncer.is_idle());
    }

    #[test]
    fn test_paths_are_independent_and_sorted() {
        let debouncer = EventDebouncer::new(WINDOW);

        debouncer.record(PathBuf::from("/content/b.md"), ChangeKind::Created);
        debouncer.record(PathBuf::from("/content/a.md"), ChangeKind::Removed);
        thread::sleep(PAST_WINDOW);

        assert_eq!(
            debouncer.drain_ready(),
            vec![
                (PathBuf::from("/content/a.md"), ChangeKind::Removed),
                (PathBuf::from("/content/b.md"), ChangeKind::Created),
            ]
        );
    }

    #[test]
    fn test_coalesce_matrix() {
        use ChangeKind::{Created, Modified, Removed};

        assert_eq!(coalesce(Created, Created), Some(Created));
        assert_eq!(coalesce(Created, Modified), Some(Created));
        assert_eq!(coalesce(Created, Removed), None);

        assert_eq!(coalesce(Modified, Created), Some(Created));
        assert_eq!(coalesce(Modified, Modified), Some(Modified));
        assert_eq!(coalesce(Modified, Removed), Some(Removed));

        assert_eq!(coalesce(Removed, Created), Some(Modified));
        assert_eq!(coalesce(Removed, Modified), Some(Removed));
        assert_eq!(coalesce(Removed, Removed), Some(Removed));
    }
}
