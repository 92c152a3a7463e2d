//! `hcr serve` command implementation.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use hcr_config::{CliSettings, Config, ServerChannel, WatchConfig};
use hcr_server::{ContentVersionFile, ServerHandle, ServerOptions};
use hcr_watch::{ContentChange, ContentWatcher};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover hot-reload.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config and environment).
    #[arg(short, long)]
    port: Option<u16>,

    /// Namespace path (overrides config and environment).
    #[arg(long)]
    namespace: Option<String>,

    /// Event name broadcast on change (overrides config and environment).
    #[arg(long)]
    event_name: Option<String>,

    /// Content directory to watch (overrides config).
    #[arg(short, long)]
    watch_dir: Option<PathBuf>,

    /// Enable content watching (default: enabled).
    #[arg(long)]
    watch: Option<bool>,

    /// Disable content watching; the server then only answers handshakes.
    #[arg(long, conflicts_with = "watch")]
    no_watch: bool,

    /// Content version file bumped on every change (overrides config).
    #[arg(long)]
    content_version_file: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// Runs until Ctrl-C.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let watch_enabled = self.resolve_watch_enabled();

        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            namespace_path: self.namespace,
            event_name: self.event_name,
            watch_dir: self.watch_dir,
            watch_enabled,
            content_version_file: self.content_version_file,
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        if let Some(path) = &config.config_path {
            output.field("Config", path.display());
        }

        let channel = ServerChannel::resolve(&config.channel_options());
        output.info(&format!(
            "Starting notification server on {}:{}",
            config.server.host, channel.port
        ));
        output.field("Namespace", &channel.namespace_path);
        output.field("Event", &channel.event_name);

        let server =
            hcr_server::start(ServerOptions::new(channel).with_host(config.server.host.as_str()));
        match server.ready().await {
            Ok(addr) => output.success(&format!(
                "Listening on ws://{addr}{}",
                server.channel().namespace_path
            )),
            // Degraded mode: keep running, broadcasts reach nobody
            Err(err) => output.warning(&format!("Notification server unavailable: {err}")),
        }

        let watcher = if config.watch_resolved.enabled {
            Some(start_watcher(&config.watch_resolved, &server, &output)?)
        } else {
            output.field("Content watching", "disabled");
            None
        };

        output.highlight("Press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;

        output.info("Shutting down");
        drop(watcher);
        server.shutdown();
        Ok(())
    }

    /// Resolve `watch_enabled` from --watch/--no-watch flags.
    fn resolve_watch_enabled(&self) -> Option<bool> {
        self.no_watch.then_some(false).or(self.watch)
    }
}

fn start_watcher(
    watch: &WatchConfig,
    server: &ServerHandle,
    output: &Output,
) -> Result<ContentWatcher, CliError> {
    let version_file = watch.content_version_file.as_ref().map(ContentVersionFile::new);
    let debounce = Duration::from_millis(watch.debounce_ms);

    output.field("Watching", watch.dir.display());
    if let Some(file) = &version_file {
        output.field("Content version file", file.path().display());
    }

    let sink = change_handler(server.clone(), version_file);
    let watcher = ContentWatcher::start(&watch.dir, &watch.patterns, debounce, sink)?;
    Ok(watcher)
}

/// Build the watcher callback: bump the version file, then notify sessions.
fn change_handler(
    server: ServerHandle,
    version_file: Option<ContentVersionFile>,
) -> impl Fn(&[ContentChange]) + Send + 'static {
    let runtime = tokio::runtime::Handle::current();
    move |changes: &[ContentChange]| {
        if let Some(file) = &version_file {
            // The watcher thread is outside the runtime
            let _guard = runtime.enter();
            file.bump_in_background();
        }
        tracing::debug!(changes = changes.len(), "Notifying sessions");
        server.broadcast();
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ServeArgs,
    }

    fn parse(args: &[&str]) -> ServeArgs {
        TestCli::try_parse_from(std::iter::once("serve").chain(args.iter().copied()))
            .unwrap()
            .args
    }

    #[test]
    fn test_watch_enabled_default_is_unset() {
        assert_eq!(parse(&[]).resolve_watch_enabled(), None);
    }

    #[test]
    fn test_no_watch_disables() {
        assert_eq!(parse(&["--no-watch"]).resolve_watch_enabled(), Some(false));
    }

    #[test]
    fn test_watch_flag_value() {
        assert_eq!(parse(&["--watch", "true"]).resolve_watch_enabled(), Some(true));
    }

    #[test]
    fn test_watch_conflicts_with_no_watch() {
        let result =
            TestCli::try_parse_from(["serve", "--watch", "true", "--no-watch"]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_change_handler_bumps_version_and_broadcasts() {
        let dir = tempfile::tempdir().unwrap();
        let version = ContentVersionFile::new(dir.path().join("version.js"));
        let channel = ServerChannel {
            port: 0,
            ..ServerChannel::default()
        };
        let server = hcr_server::start(ServerOptions::new(channel).with_host("127.0.0.1"));
        server.ready().await.unwrap();
        let handler = change_handler(server.clone(), Some(version.clone()));

        // Call from a plain thread, like the watcher does
        std::thread::spawn(move || handler(&[]))
            .join()
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while version.current() != 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        server.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_batches_bump_once_each() {
        let dir = tempfile::tempdir().unwrap();
        let version = ContentVersionFile::new(dir.path().join("version.js"));
        let channel = ServerChannel {
            port: 0,
            ..ServerChannel::default()
        };
        let server = hcr_server::start(ServerOptions::new(channel).with_host("127.0.0.1"));
        let handler = change_handler(server.clone(), Some(version.clone()));

        // Back-to-back batches leave several bumps in flight at once
        std::thread::spawn(move || {
            for _ in 0..10 {
                handler(&[]);
            }
        })
        .join()
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while version.current() < 10 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(version.current(), 10);
        server.shutdown();
    }
}
