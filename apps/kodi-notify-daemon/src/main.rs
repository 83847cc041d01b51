mod lifecycle;
mod monitor;

use anyhow::Context;
use clap::Parser;
use kodi_notify_config::{AddonConfig, AddonInfo};
use kodi_notify_ipc::{serve, KodiNotifier, LogNotifier, NotificationHandler, Notifier};
use lifecycle::{ServiceLifecycle, ICON_CACHE_DIR};
use monitor::SignalMonitor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the add-on configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log notifications instead of sending them to Kodi
    #[arg(long)]
    dry_run: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    // Before any thread exists, see SignalMonitor::install.
    let monitor = SignalMonitor::install();

    let config_path = args.config.unwrap_or_else(AddonConfig::default_path);
    let config = Arc::new(
        AddonConfig::new(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?,
    );

    let addon_id = config.get_info("id")?;
    let span = tracing::info_span!("addon", id = %addon_id);
    let _enter = span.enter();
    info!("Using configuration {}", config.path().display());

    let cache_dir = config.profile_dir()?.join(ICON_CACHE_DIR);

    let notifier: Arc<dyn Notifier> = if args.dry_run {
        Arc::new(LogNotifier)
    } else {
        let (host, port) = config.jsonrpc_endpoint()?;
        info!("Forwarding notifications to Kodi at {}:{}", host, port);
        Arc::new(KodiNotifier::new(host, port))
    };

    let handler = Arc::new(NotificationHandler::new(config.clone(), config, notifier));

    let mut lifecycle = ServiceLifecycle::new(monitor, cache_dir);
    lifecycle.run(move || async move {
        serve(handler)
            .await
            .context("Failed to register notification service")
    })
}
