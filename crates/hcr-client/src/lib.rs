//! Client reload agent for hot content reload.
//!
//! Wraps a page component so that, while mounted, it keeps a WebSocket
//! subscription to the notification server. When the configured change event
//! arrives, the agent asks the [`Router`] to replace the current route with
//! itself, without scrolling, so the host refetches page data in place.
//!
//! ```ignore
//! let wrapped = HotContentReload::default().wrap(BlogPost);
//! let mounted = wrapped.mount(&location, router, MountOptions::default());
//!
//! // Every render records the route to refresh
//! let html = mounted.render(&props, &RouteState::new("/posts/[slug]", "/posts/hello"));
//!
//! // Closing the page closes the subscription
//! mounted.unmount();
//! ```
//!
//! Navigation failures are logged and counted, never propagated. The
//! subscription reconnects with exponential backoff until unmounted.

mod agent;
mod connection;
mod refresh;
mod router;

pub use agent::{
    Component, HotContentReload, MountOptions, MountedReload, ReloadOptions, WithHotContentReload,
};
pub use connection::{ConnectionState, ReconnectPolicy};
pub use refresh::RefreshCell;
pub use router::{NavigateOptions, NavigationError, RouteState, Router};
