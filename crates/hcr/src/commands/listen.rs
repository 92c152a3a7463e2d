//! `hcr listen` command implementation.
//!
//! Mounts a reload agent the way a page would and logs what it does. Handy
//! for checking a running `hcr serve` (or any compatible server) by hand.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Args;
use hcr_client::{
    Component, ConnectionState, HotContentReload, MountOptions, NavigateOptions, NavigationError,
    ReloadOptions, RouteState, Router,
};
use hcr_config::{ChannelOptions, PageLocation};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the listen command.
#[derive(Args)]
pub(crate) struct ListenArgs {
    /// Origin of the page the agent pretends to run on (e.g. http://localhost:3000).
    #[arg(long)]
    origin: String,

    /// Route to refresh on every change.
    #[arg(long, default_value = "/")]
    path: String,

    /// Server port (default: environment, then the origin's port).
    #[arg(short, long)]
    port: Option<u16>,

    /// Namespace path (overrides environment).
    #[arg(long)]
    namespace: Option<String>,

    /// Event name to react to (overrides environment).
    #[arg(long)]
    event_name: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl ListenArgs {
    /// Execute the listen command.
    ///
    /// Runs until Ctrl-C.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Arc::new(Output::new());
        let location = PageLocation::parse(&self.origin)?;

        let reload = HotContentReload::new(ReloadOptions {
            channel: ChannelOptions {
                port: self.port,
                namespace_path: self.namespace,
                event_name: self.event_name,
            },
            ..ReloadOptions::default()
        });
        let page = reload.wrap(ListenerPage);
        let router = Arc::new(LoggingRouter {
            output: Arc::clone(&output),
        });

        let mounted = page.mount(&location, router, MountOptions::default());
        mounted.render(&(), &RouteState::from_path(&self.path));
        if let Some(url) = mounted.url() {
            output.info(&format!("{}: subscribing to {url}", page.display_name()));
        }

        let Some(mut state) = mounted.watch_state() else {
            return Ok(());
        };
        output.highlight("Press Ctrl-C to stop");

        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    break;
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *state.borrow_and_update();
                    report_state(&output, current);
                }
            }
        }

        output.field("Refreshes", mounted.refreshes());
        output.field("Failed refreshes", mounted.refresh_failures());
        mounted.unmount();
        Ok(())
    }
}

fn report_state(output: &Output, state: ConnectionState) {
    match state {
        ConnectionState::Connected => output.success("Connected"),
        ConnectionState::Disconnected => output.warning("Disconnected, retrying"),
        ConnectionState::Connecting | ConnectionState::Refreshing => {
            tracing::debug!(?state, "Agent state");
        }
    }
}

/// Page stand-in; renders nothing.
struct ListenerPage;

impl Component for ListenerPage {
    type Props = ();
    type Output = ();

    fn render(&self, _props: &()) {}

    fn display_name(&self) -> String {
        "Listener".to_owned()
    }
}

/// Router that prints navigations instead of performing them.
struct LoggingRouter {
    output: Arc<Output>,
}

#[async_trait]
impl Router for LoggingRouter {
    async fn replace(
        &self,
        pathname: &str,
        as_path: &str,
        options: NavigateOptions,
    ) -> Result<(), NavigationError> {
        self.output.info(&format!(
            "Refresh {as_path} (route {pathname}, scroll: {})",
            options.scroll
        ));
        Ok(())
    }
}
