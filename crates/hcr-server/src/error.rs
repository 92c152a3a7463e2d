//! Error types for the notification server.

use std::sync::Arc;

/// Server error type.
///
/// Cloneable so a bind failure can be handed to every handle clone that
/// awaits [`ServerHandle::ready`](crate::ServerHandle::ready).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServerError {
    /// The listener could not bind its address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The listener failed while serving.
    #[error("Server error: {0}")]
    Serve(#[source] Arc<std::io::Error>),

    /// The server stopped before it finished binding.
    #[error("Server stopped")]
    Stopped,
}

/// Error updating the content version file.
#[derive(Debug, thiserror::Error)]
#[error("Failed to update content version file {}: {source}", path.display())]
pub struct ContentVersionError {
    /// File that could not be written.
    pub path: std::path::PathBuf,
    /// Underlying I/O error.
    #[source]
    pub source: std::io::Error,
}
