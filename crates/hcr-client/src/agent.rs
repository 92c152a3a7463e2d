//! The wrapper that attaches a reload subscription to a page component.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use hcr_config::{ChannelOptions, ClientChannel, PageLocation};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connection::{Connection, ConnectionState, ReconnectPolicy, Stats};
use crate::refresh::RefreshCell;
use crate::router::{NavigateOptions, RouteState, Router};

/// A renderable page component.
pub trait Component {
    /// Props passed on every render.
    type Props;
    /// Render result.
    type Output;

    /// Render with the given props.
    fn render(&self, props: &Self::Props) -> Self::Output;

    /// Name used in diagnostics.
    fn display_name(&self) -> String {
        "Component".to_owned()
    }
}

/// Static options fixed when a component is wrapped.
#[derive(Clone, Debug, Default)]
pub struct ReloadOptions {
    /// Channel overrides; unset fields fall back to environment and defaults.
    pub channel: ChannelOptions,
    /// Reconnect delays.
    pub reconnect: ReconnectPolicy,
}

/// Factory for wrapped components.
#[derive(Clone, Debug, Default)]
pub struct HotContentReload {
    options: ReloadOptions,
}

impl HotContentReload {
    #[must_use]
    pub fn new(options: ReloadOptions) -> Self {
        Self { options }
    }

    /// Wrap a page component.
    #[must_use]
    pub fn wrap<C: Component>(&self, component: C) -> WithHotContentReload<C> {
        WithHotContentReload {
            inner: Arc::new(component),
            options: self.options.clone(),
        }
    }
}

/// Per-instance props of the wrapper.
#[derive(Clone, Copy, Debug, Default)]
pub struct MountOptions {
    /// Skip the subscription for this instance; rendering is unchanged.
    pub disable_hot_content_reload: bool,
}

/// A page component with hot content reload attached.
pub struct WithHotContentReload<C> {
    inner: Arc<C>,
    options: ReloadOptions,
}

impl<C: Component> WithHotContentReload<C> {
    /// `WithRemoteDataUpdates(<inner display name>)`.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("WithRemoteDataUpdates({})", self.inner.display_name())
    }

    /// Mount one instance.
    ///
    /// Unless disabled, opens a subscription to the channel resolved for
    /// `location` and keeps it until the returned handle is unmounted or
    /// dropped. Must be called from within a tokio runtime when enabled.
    pub fn mount(
        &self,
        location: &PageLocation,
        router: Arc<dyn Router>,
        options: MountOptions,
    ) -> MountedReload<C> {
        let cell = RefreshCell::default();
        let subscription = if options.disable_hot_content_reload {
            tracing::debug!(component = %self.display_name(), "Hot content reload disabled");
            None
        } else {
            Some(self.subscribe(location, cell.clone()))
        };

        MountedReload {
            inner: Arc::clone(&self.inner),
            router,
            cell,
            subscription,
        }
    }

    fn subscribe(&self, location: &PageLocation, cell: RefreshCell) -> Subscription {
        let channel = ClientChannel::resolve(&self.options.channel, location);
        let url = channel.url(location).to_string();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let stats = Arc::new(Stats::default());
        let cancel = CancellationToken::new();

        tracing::debug!(
            component = %self.display_name(),
            url = %url,
            event = %channel.event_name,
            "Subscribing to content changes"
        );

        let connection = Connection {
            url: url.clone(),
            event_name: channel.event_name,
            cell,
            state: state_tx,
            stats: Arc::clone(&stats),
            cancel: cancel.clone(),
            policy: self.options.reconnect,
        };
        let task = tokio::spawn(connection.run());

        Subscription {
            url,
            state: state_rx,
            stats,
            cancel,
            task,
        }
    }
}

struct Subscription {
    url: String,
    state: watch::Receiver<ConnectionState>,
    stats: Arc<Stats>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// A mounted instance. Dropping it unmounts.
pub struct MountedReload<C: Component> {
    inner: Arc<C>,
    router: Arc<dyn Router>,
    cell: RefreshCell,
    subscription: Option<Subscription>,
}

impl<C: Component> MountedReload<C> {
    /// Render the wrapped component and remember `route` as the refresh
    /// target for the next change event.
    pub fn render(&self, props: &C::Props, route: &RouteState) -> C::Output {
        if self.subscription.is_some() {
            let router = Arc::clone(&self.router);
            let route = route.clone();
            self.cell.set(move || {
                let router = Arc::clone(&router);
                let route = route.clone();
                async move {
                    router
                        .replace(&route.pathname, &route.as_path, NavigateOptions::soft())
                        .await
                }
            });
        }
        self.inner.render(props)
    }

    /// Current connection state. Always `Disconnected` when disabled.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.subscription
            .as_ref()
            .map_or(ConnectionState::Disconnected, |sub| *sub.state.borrow())
    }

    /// Receiver for state changes, or `None` when disabled.
    #[must_use]
    pub fn watch_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.subscription.as_ref().map(|sub| sub.state.clone())
    }

    /// WebSocket URL of the subscription, or `None` when disabled.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.subscription.as_ref().map(|sub| sub.url.as_str())
    }

    /// Hello replies received across all connections.
    #[must_use]
    pub fn handshakes(&self) -> u64 {
        self.counter(|stats| stats.handshakes.load(Ordering::Relaxed))
    }

    /// Successful refresh navigations.
    #[must_use]
    pub fn refreshes(&self) -> u64 {
        self.counter(|stats| stats.refreshes.load(Ordering::Relaxed))
    }

    /// Refresh navigations that failed and were swallowed.
    #[must_use]
    pub fn refresh_failures(&self) -> u64 {
        self.counter(|stats| stats.failures.load(Ordering::Relaxed))
    }

    /// Tear down the subscription.
    pub fn unmount(self) {
        drop(self);
    }

    fn counter(&self, read: impl Fn(&Stats) -> u64) -> u64 {
        self.subscription.as_ref().map_or(0, |sub| read(&sub.stats))
    }
}

impl<C: Component> Drop for MountedReload<C> {
    fn drop(&mut self) {
        if let Some(sub) = self.subscription.take() {
            tracing::debug!(url = %sub.url, "Unmounting, closing subscription");
            sub.cancel.cancel();
            sub.task.abort();
        }
    }
}
