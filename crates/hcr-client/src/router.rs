//! Navigation seam between the agent and the hosting UI.

use async_trait::async_trait;

/// Routing state of one render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteState {
    /// Route pattern, e.g. `/posts/[slug]`.
    pub pathname: String,
    /// Path as shown in the address bar, including the query.
    pub as_path: String,
}

impl RouteState {
    /// Route with distinct pattern and visible path.
    #[must_use]
    pub fn new(pathname: impl Into<String>, as_path: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            as_path: as_path.into(),
        }
    }

    /// Route whose pattern and visible path are the same.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        Self::new(path, path)
    }
}

/// Options for a navigation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NavigateOptions {
    /// Reset the scroll position after navigating.
    pub scroll: bool,
}

impl NavigateOptions {
    /// Soft refresh: keep the scroll position.
    #[must_use]
    pub fn soft() -> Self {
        Self { scroll: false }
    }
}

/// Navigation failure reported by a [`Router`].
#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    /// The route no longer resolves.
    #[error("Route not found: {0}")]
    NotFound(String),
    /// The navigation was superseded or cancelled.
    #[error("Navigation aborted: {0}")]
    Aborted(String),
    /// Any other router failure.
    #[error("Navigation failed: {0}")]
    Failed(String),
}

/// Client-side router able to replace the current history entry.
#[async_trait]
pub trait Router: Send + Sync {
    /// Navigate to `as_path` (rendered with `pathname`), replacing the
    /// current history entry instead of pushing a new one.
    async fn replace(
        &self,
        pathname: &str,
        as_path: &str,
        options: NavigateOptions,
    ) -> Result<(), NavigationError>;
}
