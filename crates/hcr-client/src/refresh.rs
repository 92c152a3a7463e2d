//! Pending refresh callback.
//!
//! The subscription lives for the whole mount, but the routing state changes
//! on every render. Instead of rebuilding the subscription, each render
//! writes a fresh closure into this single-slot cell and the subscription
//! reads whatever is there when an event arrives.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;

use crate::router::NavigationError;

type RefreshFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), NavigationError>> + Send + Sync>;

/// Single-slot holder for the current refresh closure.
#[derive(Clone, Default)]
pub struct RefreshCell {
    slot: Arc<RwLock<Option<RefreshFn>>>,
}

impl RefreshCell {
    /// Replace the stored closure.
    pub fn set<F, Fut>(&self, refresh: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), NavigationError>> + Send + 'static,
    {
        let refresh: RefreshFn = Arc::new(move || Box::pin(refresh()));
        *self.slot.write() = Some(refresh);
    }

    /// Whether a closure has been stored yet.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Run the closure stored at the time of the call.
    ///
    /// Returns `None` when nothing has been rendered yet. The lock is not
    /// held while the refresh runs, so renders are never blocked by it.
    pub async fn invoke(&self) -> Option<Result<(), NavigationError>> {
        let refresh = self.slot.read().clone()?;
        Some(refresh().await)
    }
}
