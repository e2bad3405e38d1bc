//! Global init-order orchestration and graceful shutdown (spec §5).
//!
//! Grounded in `kube_runtime::controller::Controller::shutdown_on_signal`
//! for the shutdown half, and in the readiness-gated startup chain from
//! `sentinel_server/globals.py`'s `init_config` / `init_plugin_manager` / ...
//! sequence for the startup half. Enforces spec §5's init order: `config ->
//! plugin_manager -> {alert_manager, subscription_registrar} ->
//! {video_source_manager, subscriber_manager} -> *_loaded_from_db`.
//!
//! `Lifecycle::start` itself executes that order as a single linear `async
//! fn` (Rust's own sequencing already guarantees it), but each stage also
//! publishes a [`ReadyState`] so a caller running concurrently — e.g. an API
//! layer that starts accepting connections before the managers finish
//! restoring persisted entities — can `wait()` on exactly the stage it
//! depends on instead of polling.

use std::sync::Arc;

use crate::alert::manager::AUXILIARY_SUBSCRIBER_ID;
use crate::alert::AlertManager;
use crate::config::Configuration;
use crate::plugin::{PluginRegistry, PluginSource};
use crate::readiness::{ReadyState, ReadyToken};
use crate::store::{AlertRepository, SubscriberRepository, VideoSourceRepository};
use crate::subscriber::registrar::SubscriberId;
use crate::subscriber::{SubscriberManager, SubscriptionRegistrar};
use crate::video_source::VideoSourceManager;

/// Every manager constructed by [`Lifecycle::start`], handed back to the caller.
pub struct Runtime {
    pub config: Configuration,
    pub plugins: Arc<PluginRegistry>,
    pub registrar: Arc<SubscriptionRegistrar>,
    pub alert_manager: Arc<AlertManager>,
    pub video_sources: Arc<VideoSourceManager>,
    pub subscribers: Arc<SubscriberManager>,
}

/// Per-stage readiness signals, each published the moment that stage of
/// [`Lifecycle::start`] completes.
pub struct StartupReadiness {
    pub config: ReadyState,
    pub plugins: ReadyState,
    pub wiring: ReadyState,
    pub managers: ReadyState,
    pub restored: ReadyState,
}

/// Drives the startup sequence and exposes the readiness signals that gate it.
pub struct Lifecycle {
    token: ReadyToken,
    stages: StartupReadiness,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        let token = ReadyToken::new();
        let stages = StartupReadiness {
            config: token.child(),
            plugins: token.child(),
            wiring: token.child(),
            managers: token.child(),
            restored: token.child(),
        };
        Self { token, stages }
    }

    /// The per-stage readiness signals, clonable so other tasks can await one.
    #[must_use]
    pub fn stages(&self) -> &StartupReadiness {
        &self.stages
    }

    /// True once every startup stage has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.token.is_ready()
    }

    /// Suspends until every startup stage has completed.
    pub async fn wait_ready(&self) {
        self.token.wait_all().await;
    }

    /// Runs the full startup sequence and returns the constructed managers,
    /// with every persisted video source / subscriber restored.
    pub async fn start(
        &self,
        config: Configuration,
        plugin_source: &dyn PluginSource,
        video_source_repo: Arc<dyn VideoSourceRepository>,
        subscriber_repo: Arc<dyn SubscriberRepository>,
        alert_repo: Arc<dyn AlertRepository>,
    ) -> Runtime {
        let span = tracing::info_span!("lifecycle_start");
        let _enter = span.enter();

        tracing::info!("loading configuration");
        self.stages.config.ready();

        tracing::info!(whitelist_size = config.plugin_whitelist.len(), "discovering plugins");
        let plugins = Arc::new(PluginRegistry::discover(plugin_source, config.plugin_whitelist.clone()));
        self.stages.plugins.ready();

        tracing::info!("wiring alert manager and subscription registrar");
        let registrar = Arc::new(SubscriptionRegistrar::new());
        let alert_manager = AlertManager::new(alert_repo);
        registrar
            .add_subscriber(SubscriberId(AUXILIARY_SUBSCRIBER_ID), alert_manager.clone())
            .await;
        self.stages.wiring.ready();

        tracing::info!("constructing video source and subscriber managers");
        let video_sources = VideoSourceManager::new(video_source_repo, plugins.clone(), registrar.clone(), alert_manager.clone());
        let subscribers = Arc::new(SubscriberManager::new(subscriber_repo, plugins.clone(), registrar.clone()));
        self.stages.managers.ready();

        tracing::info!("restoring persisted video sources and subscribers");
        video_sources
            .load_from_db()
            .await
            .expect("video source persistence load_from_db failed");
        subscribers
            .load_from_db()
            .await
            .expect("subscriber persistence load_from_db failed");
        self.stages.restored.ready();

        tracing::info!("sentinel runtime fully started");

        Runtime {
            config,
            plugins,
            registrar,
            alert_manager,
            video_sources,
            subscribers,
        }
    }
}

/// Awaits a shutdown signal (Ctrl+C) and logs it, the same shape as
/// `kube_runtime::controller::Controller::shutdown_on_signal`'s one-shot
/// `tokio::signal::ctrl_c` wait. Actual pipeline teardown is handled by
/// dropping the returned [`Runtime`] (or, if a caller wants individual
/// sources to stop cleanly first, calling `disable` on each before dropping).
pub async fn shutdown_on_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(error) => tracing::error!(%error, "failed to install signal handler; shutting down anyway"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Plugin;
    use crate::store::memory::{MemoryAlertRepository, MemorySubscriberRepository, MemoryVideoSourceRepository};

    struct EmptySource;
    impl PluginSource for EmptySource {
        fn discover(&self) -> Vec<Plugin> {
            vec![]
        }
    }

    #[tokio::test]
    async fn start_brings_every_stage_ready() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.is_ready());

        let runtime = lifecycle
            .start(
                Configuration::default(),
                &EmptySource,
                Arc::new(MemoryVideoSourceRepository::new()),
                Arc::new(MemorySubscriberRepository::new()),
                Arc::new(MemoryAlertRepository::new()),
            )
            .await;

        assert!(lifecycle.is_ready());
        assert!(runtime.video_sources.list().is_empty());
        assert!(runtime.subscribers.list().is_empty());
    }
}
