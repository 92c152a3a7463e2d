//! Application state.
//!
//! Shared state for the router and every session task.

use hcr_config::ServerChannel;
use tokio_util::sync::CancellationToken;

use crate::live_reload::SessionRegistry;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Resolved channel identity.
    pub(crate) channel: ServerChannel,
    /// Connected sessions.
    pub(crate) registry: SessionRegistry,
    /// Cancelled on shutdown; session loops exit immediately.
    pub(crate) shutdown: CancellationToken,
}

impl AppState {
    pub(crate) fn new(channel: ServerChannel) -> Self {
        Self {
            channel,
            registry: SessionRegistry::default(),
            shutdown: CancellationToken::new(),
        }
    }
}
