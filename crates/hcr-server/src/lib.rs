//! Notification server for hot content reload.
//!
//! Owns one WebSocket listener, one namespace and the registry of connected
//! sessions. A change producer (usually a file watcher) holds a
//! [`ServerHandle`] and calls [`ServerHandle::broadcast`] once per logical
//! change; every connected session receives the event frame and refetches.
//!
//! # Quick Start
//!
//! ```ignore
//! use hcr_config::{ChannelOptions, ServerChannel};
//! use hcr_server::{ServerOptions, start};
//!
//! #[tokio::main]
//! async fn main() {
//!     let channel = ServerChannel::resolve(&ChannelOptions::default());
//!     let server = start(ServerOptions::new(channel));
//!
//!     // Bind errors are reported here, not by `start`
//!     if let Err(err) = server.ready().await {
//!         eprintln!("{err}");
//!     }
//!
//!     server.broadcast();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! watcher ──broadcast()──► SessionRegistry ──► session task ──► client
//!                                 ▲                 │
//!                       register / remove           └─ hello ◄─► hello
//! ```

mod app;
mod content_version;
mod error;
mod live_reload;
mod state;

use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use hcr_config::ServerChannel;
use hcr_protocol::Frame;
use state::AppState;
use tokio::sync::watch;

pub use content_version::ContentVersionFile;
pub use error::{ContentVersionError, ServerError};
pub use live_reload::SessionId;

/// Server options.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    /// Host address to bind to.
    pub host: String,
    /// Resolved channel identity.
    pub channel: ServerChannel,
}

impl ServerOptions {
    /// Options binding all interfaces for the given channel.
    #[must_use]
    pub fn new(channel: ServerChannel) -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            channel,
        }
    }

    /// Set the bind host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// `host:port` for the listener. IP literals may come with or without
    /// brackets; anything else is passed on as a host name.
    fn bind_addr(&self) -> String {
        let host = self
            .host
            .strip_prefix('[')
            .and_then(|host| host.strip_suffix(']'))
            .unwrap_or(&self.host);
        match host.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.channel.port).to_string(),
            Err(_) => format!("{host}:{}", self.channel.port),
        }
    }
}

/// Listener lifecycle as seen by handles.
#[derive(Clone, Debug)]
enum ListenerState {
    Binding,
    Bound(SocketAddr),
    Failed(ServerError),
}

/// Start the notification server.
///
/// Returns immediately; binding happens on a spawned task. A bind failure is
/// logged and reported through [`ServerHandle::ready`], and the server keeps
/// working in a degraded mode where broadcasts reach nobody.
///
/// Must be called from within a tokio runtime.
pub fn start(options: ServerOptions) -> ServerHandle {
    let state = Arc::new(AppState::new(options.channel.clone()));
    let (ready_tx, ready_rx) = watch::channel(ListenerState::Binding);

    tracing::info!(
        port = options.channel.port,
        namespace = %options.channel.namespace_path,
        event = %options.channel.event_name,
        "Starting notification server"
    );

    tokio::spawn(serve(options.bind_addr(), Arc::clone(&state), ready_tx));

    ServerHandle {
        state,
        ready: ready_rx,
    }
}

/// Bind and serve until shutdown.
async fn serve(addr: String, state: Arc<AppState>, ready: watch::Sender<ListenerState>) {
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            let err = ServerError::Bind {
                addr,
                source: Arc::new(err),
            };
            tracing::error!(error = %err, "Notification server unavailable, broadcasts will reach no sessions");
            ready.send_replace(ListenerState::Failed(err));
            return;
        }
    };

    match listener.local_addr() {
        Ok(local) => {
            tracing::info!(address = %local, "Notification server listening");
            ready.send_replace(ListenerState::Bound(local));
        }
        Err(err) => {
            ready.send_replace(ListenerState::Failed(ServerError::Serve(Arc::new(err))));
            return;
        }
    }

    let app = app::create_router(Arc::clone(&state));
    let shutdown = state.shutdown.clone();

    // Dropping the serve future closes the listener and every open
    // connection without waiting for in-flight messages.
    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            if let Err(err) = result {
                tracing::error!(error = %err, "Notification server stopped");
            }
        }
        () = shutdown.cancelled() => {
            tracing::info!("Notification server shut down");
        }
    }
}

/// Handle to a running notification server.
///
/// Cheap to clone. Dropping handles does not stop the server; call
/// [`ServerHandle::shutdown`].
#[derive(Clone)]
pub struct ServerHandle {
    state: Arc<AppState>,
    ready: watch::Receiver<ListenerState>,
}

impl ServerHandle {
    /// Send the change event to every connected session.
    ///
    /// Fire and forget: no acknowledgement, no retry, no backlog for sessions
    /// that connect later. Returns the number of sessions the event was
    /// queued for.
    pub fn broadcast(&self) -> usize {
        let frame = Frame::new(self.state.channel.event_name.as_str());
        let sessions = self.state.registry.broadcast(&frame);
        tracing::info!(
            event = %frame.event,
            sessions,
            "Broadcasting change notification"
        );
        sessions
    }

    /// Wait until the listener is bound.
    ///
    /// # Errors
    ///
    /// Returns the bind error, or [`ServerError::Stopped`] if the server was
    /// shut down before binding completed.
    pub async fn ready(&self) -> Result<SocketAddr, ServerError> {
        let mut ready = self.ready.clone();
        let state = ready
            .wait_for(|state| !matches!(state, ListenerState::Binding))
            .await
            .map_err(|_| ServerError::Stopped)?
            .clone();

        match state {
            ListenerState::Bound(addr) => Ok(addr),
            ListenerState::Failed(err) => Err(err),
            ListenerState::Binding => Err(ServerError::Stopped),
        }
    }

    /// Bound address, if binding already succeeded.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match *self.ready.borrow() {
            ListenerState::Bound(addr) => Some(addr),
            _ => None,
        }
    }

    /// Number of currently connected sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state.registry.len()
    }

    /// Resolved channel identity.
    #[must_use]
    pub fn channel(&self) -> &ServerChannel {
        &self.state.channel
    }

    /// Stop accepting connections and drop every session immediately.
    pub fn shutdown(&self) {
        self.state.shutdown.cancel();
        self.state.registry.clear();
    }
}
