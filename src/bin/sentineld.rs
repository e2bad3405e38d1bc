//! Sentinel server entrypoint: loads configuration, brings up the managers
//! via [`sentinel_runtime::Lifecycle`], and runs until a shutdown signal.
//!
//! No concrete video-stream/detector/subscriber plugins ship with this
//! crate (spec §1's "plugin implementations are out of scope"); a real
//! deployment links its own `PluginSource` in, the same way `kube`'s own
//! example binaries bring their own `Client` config rather than the library
//! assuming one.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sentinel_runtime::lifecycle::shutdown_on_signal;
use sentinel_runtime::plugin::{Plugin, PluginSource};
use sentinel_runtime::store::memory::{MemoryAlertRepository, MemorySubscriberRepository, MemoryVideoSourceRepository};
use sentinel_runtime::{Configuration, Lifecycle};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sentineld", version, about = "Reactive video-surveillance orchestration server")]
struct Cli {
    /// Path to the configuration file. Defaults to `SENTINEL_CONFIG_PATH`,
    /// then `./sentinel.toml`.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// No plugins are linked into the stock binary; a deployment that needs
/// real video streams, detectors or subscribers builds its own `sentineld`
/// against this library with a `PluginSource` that returns them.
struct EmptyPluginSource;

impl PluginSource for EmptyPluginSource {
    fn discover(&self) -> Vec<Plugin> {
        Vec::new()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Configuration::resolve_path);
    let config = Configuration::load(&config_path).await?;

    let default_level = LevelFilter::from(sentinel_runtime::config::log_level_from_env());
    let filter = EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(path = %config_path.display(), "configuration loaded");

    let lifecycle = Lifecycle::new();
    let runtime = lifecycle
        .start(
            config,
            &EmptyPluginSource,
            Arc::new(MemoryVideoSourceRepository::new()),
            Arc::new(MemorySubscriberRepository::new()),
            Arc::new(MemoryAlertRepository::new()),
        )
        .await;

    tracing::info!(
        video_sources = runtime.video_sources.list().len(),
        subscribers = runtime.subscribers.list().len(),
        "sentineld ready"
    );

    shutdown_on_signal().await;
    tracing::info!("sentineld shutting down");
    Ok(())
}
