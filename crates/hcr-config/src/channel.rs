//! Channel identity resolution.
//!
//! A server and a client only talk to each other when port, namespace path
//! and event name all match. Each field is resolved independently with the
//! same precedence chain:
//!
//! 1. explicit option
//! 2. environment override (server and client read different variables)
//! 3. default constant
//!
//! The client port is the exception: when no explicit value and no override
//! exist it falls back to the port of the page the client runs on.

use url::Url;

use crate::location::PageLocation;

/// Default notification server port.
pub const DEFAULT_PORT: u16 = 8088;

/// Default namespace path.
pub const DEFAULT_NAMESPACE_PATH: &str = "/nextjs-live-updates";

/// Default change event name.
pub const DEFAULT_EVENT_NAME: &str = "props_changed";

/// Names of the environment variables consulted for each channel field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvVars {
    /// Variable overriding the port.
    pub port: &'static str,
    /// Variable overriding the namespace path.
    pub namespace_path: &'static str,
    /// Variable overriding the event name.
    pub event_name: &'static str,
}

/// Variables read by the notification server (host process environment).
pub const SERVER_ENV: EnvVars = EnvVars {
    port: "HOT_CONTENT_RELOAD_PORT",
    namespace_path: "HOT_CONTENT_RELOAD_NAMESPACE",
    event_name: "HOT_CONTENT_RELOAD_EVENT_NAME",
};

/// Variables read by the client agent.
///
/// These carry a `PUBLIC_` prefix because bundlers only inline variables
/// marked public into client code.
pub const CLIENT_ENV: EnvVars = EnvVars {
    port: "PUBLIC_HOT_CONTENT_RELOAD_PORT",
    namespace_path: "PUBLIC_HOT_CONTENT_RELOAD_NAMESPACE",
    event_name: "PUBLIC_HOT_CONTENT_RELOAD_EVENT_NAME",
};

/// Channel options as supplied by the caller. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Explicit port.
    pub port: Option<u16>,
    /// Explicit namespace path.
    pub namespace_path: Option<String>,
    /// Explicit event name.
    pub event_name: Option<String>,
}

impl ChannelOptions {
    /// Fill fields missing from `self` with the values in `fallback`.
    #[must_use]
    pub fn or(self, fallback: &ChannelOptions) -> Self {
        Self {
            port: self.port.or(fallback.port),
            namespace_path: self
                .namespace_path
                .or_else(|| fallback.namespace_path.clone()),
            event_name: self.event_name.or_else(|| fallback.event_name.clone()),
        }
    }
}

/// Resolved channel identity of a notification server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerChannel {
    /// Port to listen on.
    pub port: u16,
    /// Namespace path, always starting with `/`.
    pub namespace_path: String,
    /// Event name emitted on broadcast.
    pub event_name: String,
}

impl ServerChannel {
    /// Resolve against the process environment.
    #[must_use]
    pub fn resolve(options: &ChannelOptions) -> Self {
        Self::resolve_with(options, process_env)
    }

    /// Resolve with a custom environment lookup.
    #[must_use]
    pub fn resolve_with<F>(options: &ChannelOptions, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Overrides::new(SERVER_ENV, lookup);
        Self {
            port: options
                .port
                .or_else(|| env.port())
                .unwrap_or(DEFAULT_PORT),
            namespace_path: resolve_namespace(options, &env),
            event_name: resolve_event_name(options, &env),
        }
    }
}

impl Default for ServerChannel {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            namespace_path: DEFAULT_NAMESPACE_PATH.to_owned(),
            event_name: DEFAULT_EVENT_NAME.to_owned(),
        }
    }
}

/// Resolved channel identity of a client agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientChannel {
    /// Port to connect to. `None` means the scheme's default port.
    pub port: Option<u16>,
    /// Namespace path, always starting with `/`.
    pub namespace_path: String,
    /// Event name that triggers a refresh.
    pub event_name: String,
}

impl ClientChannel {
    /// Resolve against the process environment.
    #[must_use]
    pub fn resolve(options: &ChannelOptions, location: &PageLocation) -> Self {
        Self::resolve_with(options, location, process_env)
    }

    /// Resolve with a custom environment lookup.
    #[must_use]
    pub fn resolve_with<F>(options: &ChannelOptions, location: &PageLocation, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Overrides::new(CLIENT_ENV, lookup);
        Self {
            port: options.port.or_else(|| env.port()).or(location.port()),
            namespace_path: resolve_namespace(options, &env),
            event_name: resolve_event_name(options, &env),
        }
    }

    /// WebSocket URL of the namespace on the page's host.
    ///
    /// The scheme follows the page (`https` pages get `wss`), the port is the
    /// resolved client port, and the path is the namespace.
    #[must_use]
    pub fn url(&self, location: &PageLocation) -> Url {
        let mut url = location.origin().clone();
        // http(s) and ws(s) are all special schemes with a host, so neither
        // setter can fail here
        let _ = url.set_scheme(location.websocket_scheme());
        let _ = url.set_port(self.port);
        url.set_path(&self.namespace_path);
        url
    }
}

/// Prefix a namespace path with `/` when missing. Empty paths are rejected.
#[must_use]
pub fn normalize_namespace(path: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() {
        None
    } else if path.starts_with('/') {
        Some(path.to_owned())
    } else {
        Some(format!("/{path}"))
    }
}

fn resolve_namespace<F>(options: &ChannelOptions, env: &Overrides<F>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    options
        .namespace_path
        .as_deref()
        .and_then(normalize_namespace)
        .or_else(|| env.namespace_path())
        .unwrap_or_else(|| DEFAULT_NAMESPACE_PATH.to_owned())
}

fn resolve_event_name<F>(options: &ChannelOptions, env: &Overrides<F>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    options
        .event_name
        .clone()
        .filter(|name| !name.is_empty())
        .or_else(|| env.event_name())
        .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_owned())
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Environment overrides for one side of the channel.
struct Overrides<F> {
    vars: EnvVars,
    lookup: F,
}

impl<F> Overrides<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(vars: EnvVars, lookup: F) -> Self {
        Self { vars, lookup }
    }

    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn port(&self) -> Option<u16> {
        let raw = self.get(self.vars.port)?;
        match raw.parse() {
            Ok(port) => Some(port),
            Err(_) => {
                tracing::warn!(
                    variable = self.vars.port,
                    value = %raw,
                    "Ignoring unparsable port override"
                );
                None
            }
        }
    }

    fn namespace_path(&self) -> Option<String> {
        self.get(self.vars.namespace_path)
            .as_deref()
            .and_then(normalize_namespace)
    }

    fn event_name(&self) -> Option<String> {
        self.get(self.vars.event_name)
    }
}
