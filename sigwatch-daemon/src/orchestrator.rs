//! Component orchestration -- assembly, wiring, and lifecycle management.
//!
//! The [`Orchestrator`] loads the rule file, opens the alert log, builds the
//! sniffer and (optionally) the funnel, and runs the signal loop.
//! With `funnel.learn_rules`, funneled frames are turned into exact rules
//! through the shared [`ReloadHandle`]; otherwise they are only logged.
//!
//! # Startup Order (consumers before producers)
//!
//! 1. Funnel (router + workers, drains the pending set)
//! 2. Sniffer (capture thread, fills the pending set)
//!
//! # Shutdown Order (producers first)
//!
//! 1. Sniffer (stop capturing; nothing new enters the pending set)
//! 2. Funnel (final drain, one sentinel per worker)
//!
//! # Signals
//!
//! - `SIGHUP`: reload the rule file; failures keep the active set
//! - `SIGTERM` / `SIGINT`: graceful shutdown

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::signal::unix::{SignalKind, signal};

use sigwatch_core::config::SigwatchConfig;
use sigwatch_core::metrics as m;
use sigwatch_core::pipeline::{HealthStatus, Pipeline};
use sigwatch_core::types::RawFrame;
use sigwatch_funnel::{
    AnomalyCollaborator, CollaboratorError, Funnel, FunnelBuilder, LoggingCollaborator,
    RuleLearner,
};
use sigwatch_rules::{ReloadHandle, RuleStore};
use sigwatch_sniffer::{AlertSink, FrameSource, Sniffer, SnifferBuilder};

use crate::health::{ComponentHealth, DaemonHealth, aggregate_status};
use crate::metrics_server;

/// Interval between periodic health checks in the signal loop.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Collaborator selected by `funnel.learn_rules`.
pub enum DaemonCollaborator {
    /// Log each funneled frame.
    Logging(LoggingCollaborator),
    /// Append an exact rule for each funneled frame and reload.
    Learning(RuleLearner),
}

impl AnomalyCollaborator for DaemonCollaborator {
    fn name(&self) -> &str {
        match self {
            Self::Logging(c) => c.name(),
            Self::Learning(c) => c.name(),
        }
    }

    async fn handle(&self, frame: RawFrame) -> Result<(), CollaboratorError> {
        match self {
            Self::Logging(c) => c.handle(frame).await,
            Self::Learning(c) => c.handle(frame).await,
        }
    }
}

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: SigwatchConfig,
    reload: ReloadHandle,
    sniffer: Sniffer,
    funnel: Option<Funnel<DaemonCollaborator>>,
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration from `config_path` and build the orchestrator.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = SigwatchConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration using live capture.
    pub async fn build_from_config(config: SigwatchConfig) -> Result<Self> {
        Self::build_with_source(config, None).await
    }

    /// Build with an explicit frame source (replay, tests).
    ///
    /// With `None`, the sniffer opens the configured interface on start.
    pub async fn build_with_source(
        config: SigwatchConfig,
        source: Option<Box<dyn FrameSource>>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let rule_path = &config.sniffer.rule_path;
        let store = Arc::new(
            RuleStore::open(rule_path)
                .await
                .map_err(|e| anyhow::anyhow!("failed to load rules: {}", e))?,
        );
        let active = store.snapshot();
        tracing::info!(
            path = %rule_path,
            accepted = active.len(),
            rejected = active.load_error_count(),
            "rule file loaded"
        );
        let reload = ReloadHandle::new(Arc::clone(&store), rule_path);

        let alert_sink = Arc::new(
            AlertSink::open(&config.sniffer.alert_log_path)
                .map_err(|e| anyhow::anyhow!("failed to open alert log: {}", e))?,
        );

        let mut builder = SnifferBuilder::new()
            .config(&config)
            .rule_store(store)
            .alert_sink(alert_sink);
        if let Some(source) = source {
            builder = builder.frame_source(source);
        }

        let funnel = if config.funnel.enabled {
            let tracked = config
                .funnel
                .parsed_tracked_sources()
                .map_err(|e| anyhow::anyhow!("invalid tracked sources: {}", e))?;
            let collaborator = if config.funnel.learn_rules {
                tracing::info!(path = %rule_path, "funnel learns rules from tracked sources");
                DaemonCollaborator::Learning(RuleLearner::new(reload.clone()))
            } else {
                DaemonCollaborator::Logging(LoggingCollaborator)
            };
            let funnel = FunnelBuilder::new(collaborator)
                .config(&config.funnel)
                .build()
                .map_err(|e| anyhow::anyhow!("failed to build funnel: {}", e))?;
            builder = builder.funnel(funnel.pending(), tracked);
            Some(funnel)
        } else {
            tracing::info!("funnel disabled, unmatched frames are discarded");
            None
        };

        let sniffer = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build sniffer: {}", e))?;

        tracing::info!(
            interface = %config.sniffer.interface,
            funnel = config.funnel.enabled,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            reload,
            sniffer,
            funnel,
            start_time: Instant::now(),
        })
    }

    /// Start the funnel, then the sniffer.
    ///
    /// If the sniffer fails to start (e.g. missing capture privileges),
    /// the already-started funnel is stopped before the error is returned.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(funnel) = self.funnel.as_mut() {
            funnel
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("failed to start funnel: {}", e))?;
        }

        if let Err(e) = self.sniffer.start().await {
            tracing::warn!("sniffer startup failed, stopping funnel");
            if let Some(funnel) = self.funnel.as_mut() {
                if let Err(stop_err) = funnel.stop().await {
                    tracing::error!(
                        startup_error = %e,
                        rollback_error = %stop_err,
                        "funnel rollback failed"
                    );
                }
            }
            return Err(anyhow::anyhow!("failed to start sniffer: {}", e));
        }

        self.start_time = Instant::now();
        Ok(())
    }

    /// Stop the sniffer, then the funnel. Both are attempted; the first error is returned.
    pub async fn shutdown(&mut self) -> Result<()> {
        let mut first_error = None;

        if let Err(e) = self.sniffer.stop().await {
            tracing::error!(error = %e, "failed to stop sniffer");
            first_error.get_or_insert(anyhow::anyhow!("failed to stop sniffer: {}", e));
        }
        if let Some(funnel) = self.funnel.as_mut() {
            if let Err(e) = funnel.stop().await {
                tracing::error!(error = %e, "failed to stop funnel");
                first_error.get_or_insert(anyhow::anyhow!("failed to stop funnel: {}", e));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!("sigwatch-daemon shut down");
                Ok(())
            }
        }
    }

    /// Reload the rule file. On failure the active set is kept.
    ///
    /// Returns the number of rules in the new active set.
    pub async fn reload_rules(&self) -> Result<usize> {
        let set = self
            .reload
            .reload()
            .await
            .map_err(|e| anyhow::anyhow!("rule reload failed: {}", e))?;
        tracing::info!(
            rules = set.len(),
            rejected = set.load_error_count(),
            "rules reloaded"
        );
        Ok(set.len())
    }

    /// Start all components, serve signals until shutdown, then stop.
    pub async fn run(&mut self) -> Result<()> {
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;
        let mut sighup = signal(SignalKind::hangup())
            .map_err(|e| anyhow::anyhow!("failed to install SIGHUP handler: {}", e))?;

        self.start().await?;

        let mut health_tick = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        health_tick.tick().await;

        tracing::info!("entering main event loop");
        let signal_name = loop {
            tokio::select! {
                _ = sigterm.recv() => break "SIGTERM",
                _ = sigint.recv() => break "SIGINT",
                _ = sighup.recv() => {
                    tracing::info!("SIGHUP received, reloading rules");
                    if let Err(e) = self.reload_rules().await {
                        tracing::warn!(error = %e, "keeping previous rule set");
                    }
                }
                _ = health_tick.tick() => {
                    let health = self.health().await;
                    match &health.status {
                        HealthStatus::Healthy => tracing::debug!(status = %health.status, "health check"),
                        status => tracing::warn!(status = %status, "daemon not healthy"),
                    }
                }
            }
        };
        tracing::info!(signal = signal_name, "shutdown signal received");

        self.shutdown().await
    }

    /// Current aggregated health.
    pub async fn health(&self) -> DaemonHealth {
        let mut components = vec![ComponentHealth {
            name: "sniffer".to_owned(),
            enabled: true,
            status: self.sniffer.health_check().await,
        }];
        components.push(ComponentHealth {
            name: "funnel".to_owned(),
            enabled: self.funnel.is_some(),
            status: match &self.funnel {
                Some(funnel) => funnel.health_check().await,
                None => HealthStatus::Unhealthy("disabled".to_owned()),
            },
        });

        let uptime_secs = self.start_time.elapsed().as_secs();
        if self.config.metrics.enabled {
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status: aggregate_status(&components),
            uptime_secs,
            active_rules: self.reload.snapshot().len(),
            components,
        }
    }

    /// Rule reload handle, for collaborators that add rules.
    pub fn reload_handle(&self) -> ReloadHandle {
        self.reload.clone()
    }

    /// Loaded configuration.
    pub fn config(&self) -> &SigwatchConfig {
        &self.config
    }

    /// Sniffer counters.
    pub fn sniffer(&self) -> &Sniffer {
        &self.sniffer
    }
}
