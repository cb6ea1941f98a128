//! Engine orchestration -- configuration, lifecycle and shutdown.
//!
//! The [`Orchestrator`] owns the netlog [`Engine`]. It validates the
//! configuration, installs the metrics exporter, builds the engine from the
//! device profiles, and then runs until a shutdown signal arrives or one of
//! the engine's units dies.
//!
//! # Run sequence
//!
//! 1. Write the PID file (if configured)
//! 2. Start the engine (key exchange, listeners, workers, publishers)
//! 3. Wait for SIGTERM / SIGINT or an engine failure
//! 4. Stop the engine, remove the PID file
//!
//! An engine failure is returned as an error so the process exits non-zero.

use std::future::Future;
use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::broadcast;

use netlog_core::config::NetlogConfig;
use netlog_core::metrics as m;
use netlog_core::pipeline::{HealthStatus, Pipeline};
use netlog_pipeline::{Engine, EngineBuilder};

use crate::health::{ComponentHealth, DaemonHealth, aggregate_status};
use crate::metrics_server;

const UPTIME_UPDATE_INTERVAL_SECS: u64 = 10;

/// The daemon orchestrator.
pub struct Orchestrator {
    config: NetlogConfig,
    engine: Engine,
    shutdown_tx: broadcast::Sender<()>,
    start_time: Instant,
}

impl Orchestrator {
    /// Load `netlog.toml`, apply `NETLOG_*` overrides and build.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = NetlogConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Fails when the configuration is invalid or no device profile
    /// could be compiled.
    pub async fn build_from_config(config: NetlogConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let engine = EngineBuilder::new()
            .config(config.clone())
            .build()
            .await
            .map_err(|e| anyhow::anyhow!("failed to build engine: {}", e))?;

        let devices = engine.devices();
        tracing::info!(
            devices = ?devices,
            listeners = config.listeners.len(),
            publishers = config.publishers.len(),
            "orchestrator initialized"
        );
        record_daemon_metrics(devices.len());

        let (shutdown_tx, _) = broadcast::channel(4);
        Ok(Self {
            config,
            engine,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start the engine and block until SIGTERM / SIGINT or engine failure.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Start the engine and block until `shutdown` resolves or the engine fails.
    ///
    /// `shutdown` yields the name of whatever asked for the stop.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        let pid_file = self.config.general.pid_file.clone();
        if !pid_file.is_empty() {
            write_pid_file(Path::new(&pid_file))?;
        }

        if let Err(e) = self.engine.start().await {
            tracing::error!(error = %e, "engine failed to start");
            if !pid_file.is_empty() {
                remove_pid_file(Path::new(&pid_file));
            }
            return Err(anyhow::anyhow!("failed to start engine: {}", e));
        }
        self.start_time = Instant::now();

        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        tracing::info!(
            listeners = ?self.engine.listener_addrs(),
            key_exchange = ?self.engine.auth_addr(),
            "netlog daemon running"
        );

        let outcome = tokio::select! {
            signal = shutdown => signal.map(|name| {
                tracing::info!(signal = name, "shutdown signal received");
            }),
            () = self.engine.wait() => {
                tracing::error!("engine stopped without a shutdown request");
                Ok(())
            }
        };

        let _ = self.shutdown_tx.send(());
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        let stopped = self.engine.stop().await;
        if !pid_file.is_empty() {
            remove_pid_file(Path::new(&pid_file));
        }

        outcome?;
        stopped.map_err(|e| anyhow::anyhow!("engine exited with error: {}", e))
    }

    /// Current aggregated health.
    pub async fn health(&self) -> DaemonHealth {
        let security = !self.config.auth.disable_security;
        let key_exchange = match (self.engine.state_name(), self.engine.auth_addr()) {
            ("running", None) => HealthStatus::Unhealthy("not listening".to_owned()),
            ("running", Some(_)) => HealthStatus::Healthy,
            (state, _) => HealthStatus::Unhealthy(state.to_owned()),
        };

        let components = vec![
            ComponentHealth {
                name: "engine".to_owned(),
                enabled: true,
                status: self.engine.health_check().await,
            },
            ComponentHealth {
                name: "key-exchange".to_owned(),
                enabled: security,
                status: key_exchange,
            },
        ];

        DaemonHealth {
            status: aggregate_status(&components),
            uptime_secs: self.start_time.elapsed().as_secs(),
            devices: self.engine.devices().into_iter().map(str::to_owned).collect(),
            components,
        }
    }

    /// The loaded configuration.
    pub fn config(&self) -> &NetlogConfig {
        &self.config
    }

    /// The engine, for in-process subscribers.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

/// Wait for SIGTERM or SIGINT and return its name.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current PID, refusing to overwrite an existing file.
///
/// The file is created atomically with mode 0600, its parent with 0700.
fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new().mode(0o700).recursive(true).create(parent)?;
        }
        #[cfg(not(unix))]
        fs::create_dir_all(parent)?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!("PID file {} is not a regular file", path.display()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    let pid = std::process::id();
    writeln!(file, "{}", pid)?;
    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

fn remove_pid_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "PID file removed"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file"),
    }
}

fn record_daemon_metrics(profiles: usize) {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::DAEMON_PROFILES_LOADED).set(profiles as f64);
}

fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(UPTIME_UPDATE_INTERVAL_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    })
}
