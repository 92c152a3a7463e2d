//! Subscription task for one mounted agent.
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ◄──► Refreshing
//!      ▲               │              │
//!      └─── backoff ◄──┴──────────────┘
//! ```

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hcr_protocol::Frame;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::refresh::RefreshCell;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection state of a mounted agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; either unmounted, disabled or waiting to retry.
    Disconnected,
    /// Opening the WebSocket.
    Connecting,
    /// Connected and waiting for events.
    Connected,
    /// Running the refresh navigation for a received event.
    Refreshing,
}

/// Reconnect delays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound on the delay.
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            max: Duration::from_secs(5),
        }
    }
}

/// Exponential backoff over a [`ReconnectPolicy`].
#[derive(Debug)]
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt. Doubles each call up to the cap.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let factor = 1u32 << self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);
        self.policy
            .base
            .saturating_mul(factor)
            .min(self.policy.max)
    }

    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Counters observable from the mount handle.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub(crate) handshakes: AtomicU64,
    pub(crate) refreshes: AtomicU64,
    pub(crate) failures: AtomicU64,
}

/// Everything the subscription task needs.
pub(crate) struct Connection {
    pub(crate) url: String,
    pub(crate) event_name: String,
    pub(crate) cell: RefreshCell,
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) stats: Arc<Stats>,
    pub(crate) cancel: CancellationToken,
    pub(crate) policy: ReconnectPolicy,
}

/// Why a connected session ended.
enum SessionEnd {
    Cancelled,
    Closed,
    Failed(String),
}

impl Connection {
    /// Connect, listen and reconnect until cancelled.
    pub(crate) async fn run(self) {
        let mut backoff = Backoff::new(self.policy);

        loop {
            self.set_state(ConnectionState::Connecting);
            let attempt = tokio::select! {
                () = self.cancel.cancelled() => break,
                attempt = connect_async(self.url.as_str()) => attempt,
            };

            match attempt {
                Ok((ws, _)) => {
                    backoff.reset();
                    tracing::info!(url = %self.url, "Connected to notification server");
                    self.set_state(ConnectionState::Connected);

                    match self.session(ws).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Closed => {
                            tracing::info!(url = %self.url, "Notification server closed the connection");
                        }
                        SessionEnd::Failed(reason) => {
                            tracing::warn!(url = %self.url, error = %reason, "Connection lost");
                        }
                    }
                }
                Err(err) => {
                    tracing::debug!(url = %self.url, error = %err, "Connection attempt failed");
                }
            }

            self.set_state(ConnectionState::Disconnected);
            let delay = backoff.next_delay();
            tracing::debug!(?delay, "Reconnecting after delay");
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::debug!(url = %self.url, "Subscription stopped");
    }

    async fn session(&self, mut ws: WsStream) -> SessionEnd {
        let hello = match Frame::hello().encode() {
            Ok(text) => Message::Text(text.into()),
            Err(err) => return SessionEnd::Failed(err.to_string()),
        };
        if let Err(err) = ws.send(hello).await {
            return SessionEnd::Failed(err.to_string());
        }

        loop {
            let msg = tokio::select! {
                () = self.cancel.cancelled() => {
                    // Best effort; the socket is dropped either way
                    let _ = ws.close(None).await;
                    return SessionEnd::Cancelled;
                }
                msg = ws.next() => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => match Frame::decode(text.as_str()) {
                    Ok(frame) if frame.is_hello() => {
                        self.stats.handshakes.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!("Handshake acknowledged");
                    }
                    Ok(frame) if frame.event == self.event_name => {
                        if self.refresh().await.is_break() {
                            return SessionEnd::Cancelled;
                        }
                    }
                    Ok(frame) => {
                        tracing::debug!(event = %frame.event, "Ignoring unrelated event");
                    }
                    Err(err) => tracing::debug!(error = %err, "Ignoring malformed frame"),
                },
                Some(Ok(Message::Close(_))) | None => return SessionEnd::Closed,
                Some(Ok(_)) => {}
                Some(Err(err)) => return SessionEnd::Failed(err.to_string()),
            }
        }
    }

    /// Run the current refresh closure. Breaks if the mount was cancelled
    /// mid-navigation.
    async fn refresh(&self) -> ControlFlow<()> {
        self.set_state(ConnectionState::Refreshing);

        let outcome = tokio::select! {
            () = self.cancel.cancelled() => return ControlFlow::Break(()),
            outcome = self.cell.invoke() => outcome,
        };

        match outcome {
            Some(Ok(())) => {
                self.stats.refreshes.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Refreshed page data after content change");
            }
            Some(Err(err)) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %err, "Content refresh navigation failed");
            }
            None => tracing::debug!("Change event before first render, nothing to refresh"),
        }

        self.set_state(ConnectionState::Connected);
        ControlFlow::Continue(())
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::trace!(from = ?previous, to = ?next, "Connection state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());

        let delays: Vec<_> = (0..7).map(|_| backoff.next_delay().as_millis()).collect();

        assert_eq!(delays, vec![250, 500, 1000, 2000, 4000, 5000, 5000]);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();

        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_backoff_survives_many_attempts() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
        });

        for _ in 0..100 {
            backoff.next_delay();
        }

        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }
}
