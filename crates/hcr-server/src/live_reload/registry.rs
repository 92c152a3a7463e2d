//! Registry of connected sessions.
//!
//! The registry is the only shared mutable state of the server. Sessions are
//! added and removed by the WebSocket lifecycle; `broadcast` fans a frame out
//! to a snapshot taken under the read lock, so concurrent joins and leaves
//! never corrupt the iteration and no session is visited twice.

use std::collections::HashMap;
use std::fmt;

use hcr_protocol::Frame;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque identifier assigned to a session at connect time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outbound queue of one session.
pub(crate) type Outbound = mpsc::UnboundedReceiver<Frame>;

/// Connected sessions of one namespace.
#[derive(Default)]
pub(crate) struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, mpsc::UnboundedSender<Frame>>>,
}

impl SessionRegistry {
    /// Register a new session and return its id and outbound queue.
    pub(crate) fn register(&self) -> (SessionId, Outbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SessionId::new();
        self.sessions.write().insert(id, tx);
        (id, rx)
    }

    /// Remove a session. Returns `false` if it was already gone.
    pub(crate) fn remove(&self, id: SessionId) -> bool {
        self.sessions.write().remove(&id).is_some()
    }

    /// Queue `frame` for every registered session.
    ///
    /// Returns the number of sessions the frame was queued for. Sessions whose
    /// queue is already closed are skipped; their task removes them.
    pub(crate) fn broadcast(&self, frame: &Frame) -> usize {
        let targets: Vec<_> = self.sessions.read().values().cloned().collect();

        targets
            .iter()
            .filter(|tx| tx.send(frame.clone()).is_ok())
            .count()
    }

    /// Number of registered sessions.
    pub(crate) fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Drop every session.
    pub(crate) fn clear(&self) {
        self.sessions.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_register_assigns_unique_ids() {
        let registry = SessionRegistry::default();

        let (a, _rx_a) = registry.register();
        let (b, _rx_b) = registry.register();

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_session() {
        let registry = SessionRegistry::default();
        let (id, _rx) = registry.register();

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_broadcast_reaches_every_session_once() {
        let registry = SessionRegistry::default();
        let mut queues: Vec<_> = (0..3).map(|_| registry.register().1).collect();

        let delivered = registry.broadcast(&Frame::new("props_changed"));

        assert_eq!(delivered, 3);
        for rx in &mut queues {
            assert_eq!(rx.try_recv().unwrap(), Frame::new("props_changed"));
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_broadcast_skips_removed_sessions() {
        let registry = SessionRegistry::default();
        let (gone, mut gone_rx) = registry.register();
        let (_kept, mut kept_rx) = registry.register();
        registry.remove(gone);

        let delivered = registry.broadcast(&Frame::new("props_changed"));

        assert_eq!(delivered, 1);
        assert!(gone_rx.try_recv().is_err());
        assert!(kept_rx.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_has_no_backlog() {
        let registry = SessionRegistry::default();
        registry.broadcast(&Frame::new("props_changed"));

        let (_id, mut rx) = registry.register();

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_skips_closed_queue() {
        let registry = SessionRegistry::default();
        let (_id, rx) = registry.register();
        drop(rx);

        assert_eq!(registry.broadcast(&Frame::hello()), 0);
    }

    #[test]
    fn test_concurrent_join_and_broadcast() {
        let registry = Arc::new(SessionRegistry::default());
        let mut existing: Vec<_> = (0..8).map(|_| registry.register().1).collect();

        let joiner = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                (0..64)
                    .map(|_| registry.register())
                    .collect::<Vec<_>>()
            })
        };
        let delivered = registry.broadcast(&Frame::new("props_changed"));
        let mut joined = joiner.join().unwrap();

        // Sessions present before the call always get exactly one frame
        assert!(delivered >= 8);
        for rx in &mut existing {
            assert!(rx.try_recv().is_ok());
            assert!(rx.try_recv().is_err());
        }
        // Late joiners get at most one
        let late: usize = joined
            .iter_mut()
            .map(|(_, rx)| usize::from(rx.try_recv().is_ok()))
            .sum();
        assert_eq!(delivered, 8 + late);
        for (_, rx) in &mut joined {
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_concurrent_leave_and_broadcast() {
        const ROUNDS: usize = 16;
        let registry = Arc::new(SessionRegistry::default());
        let mut staying: Vec<_> = (0..8).map(|_| registry.register().1).collect();
        let (leaving_ids, mut leaving): (Vec<_>, Vec<_>) =
            (0..64).map(|_| registry.register()).unzip();

        let leaver = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                leaving_ids
                    .into_iter()
                    .filter(|id| registry.remove(*id))
                    .count()
            })
        };
        let delivered: usize = (0..ROUNDS)
            .map(|_| registry.broadcast(&Frame::new("props_changed")))
            .sum();
        let removed = leaver.join().unwrap();

        assert_eq!(removed, 64);
        assert_eq!(registry.len(), 8);

        // Sessions that never left get every frame exactly once
        for rx in &mut staying {
            let received = std::iter::from_fn(|| rx.try_recv().ok()).count();
            assert_eq!(received, ROUNDS);
        }
        // Leavers get at most one frame per round, and the count matches
        let leaver_frames: usize = leaving
            .iter_mut()
            .map(|rx| {
                let received = std::iter::from_fn(|| rx.try_recv().ok()).count();
                assert!(received <= ROUNDS);
                received
            })
            .sum();
        assert_eq!(delivered, 8 * ROUNDS + leaver_frames);
    }
}
