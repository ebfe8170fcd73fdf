// # linkwatchd - Uplink Stability Daemon
//
// Thin integration layer around linkwatch-core. All stability logic lives in
// the core crate; this binary only:
//
// 1. Reads configuration from environment variables
// 2. Initializes logging and the runtime
// 3. Wires the network probe and the command target into the supervisor
// 4. Runs until SIGTERM or SIGINT, then flushes the link store
//
// The uplink selection is fixed for the lifetime of the process. Nothing in
// this binary drives the `LinkController`, so `LINKWATCH_CONNECTED` never
// changes at runtime: while it is unset or `false` the Internet check runs on
// every tick. Embedders that learn the uplink state elsewhere should run
// `Supervisor` from linkwatch-core directly and keep the controller.
//
// ## Configuration
//
// ### Device
// - `LINKWATCH_ROLE`: `extender` (default) or `gateway`
// - `LINKWATCH_UPLINK_IF`: Active uplink interface (unset: wait for a link)
// - `LINKWATCH_UPLINK_TYPE`: `eth` (default) or `gre`
// - `LINKWATCH_CONNECTED`: `true` once Internet reachability is confirmed
//
// ### Timers and Thresholds
// - `LINKWATCH_STABILITY_INTERVAL`: Stability period in seconds (default 10)
// - `LINKWATCH_WDT_INTERVAL`: Watchdog period in seconds (default 10)
// - `LINKWATCH_ROUTER_THRESHOLD`: Router failures before restart (default 5)
// - `LINKWATCH_INTERNET_THRESHOLD`: Internet failures per DHCP refresh (default 6)
//
// ### Topology
// - `LINKWATCH_BRIDGE_PORT`: Port marking a bridged uplink (default patch-w2h)
// - `LINKWATCH_WAN_BRIDGE`: Interface whose lease is refreshed (default br-wan)
//
// ### Link Store
// - `LINKWATCH_STORE_TYPE`: `memory` (default) or `file`
// - `LINKWATCH_STORE_PATH`: Path to the store file (for file store)
//
// ### Probe
// - `LINKWATCH_INTERNET_TARGETS`: Comma-separated `host:port` list
// - `LINKWATCH_NTP_SERVERS`: Comma-separated `host:port` list
// - `LINKWATCH_ROUTER_PORT`: TCP port probed on the gateway
// - `LINKWATCH_PROBE_TIMEOUT_MS`: Per-attempt timeout
//
// ### Device Actions (whitespace-separated argv)
// - `LINKWATCH_RESTART_CMD`
// - `LINKWATCH_DHCP_REFRESH_CMD` (`{ifname}` placeholder)
// - `LINKWATCH_LIVENESS_CLEAR_CMD`
// - `LINKWATCH_PORT_LOOKUP_CMD` (`{port}` placeholder)
// - `LINKWATCH_WDT_DEVICE` or `LINKWATCH_WDT_CMD`
//
// ### Logging
// - `LINKWATCH_LOG_LEVEL`: trace, debug, info (default), warn, error
//
// ## Example
//
// ```bash
// export LINKWATCH_UPLINK_IF=eth0
// export LINKWATCH_STORE_TYPE=file
// export LINKWATCH_STORE_PATH=/var/lib/linkwatch/links.json
// export LINKWATCH_RESTART_CMD="/etc/init.d/managers restart"
// export LINKWATCH_WDT_DEVICE=/dev/watchdog
//
// linkwatchd
// ```

use anyhow::{Context, Result};
use linkwatch_core::traits::LinkRecord;
use linkwatch_core::{
    DeviceRole, InterfaceType, LinkSelection, LinkStore, LinkStoreConfig, LinkwatchConfig,
    StabilityConfig, StabilityEngine, Supervisor, WatchdogConfig, WatchdogPinger,
};
use linkwatch_probe_net::{NetProbe, NetProbeConfig};
use linkwatch_target_cmd::{CommandTarget, CommandTargetConfig};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Time allowed for the in-flight tick and the final flush after a signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum LinkwatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<LinkwatchExitCode> for ExitCode {
    fn from(code: LinkwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    uplink_if: Option<String>,
    uplink_type: InterfaceType,
    connected: bool,
    core: LinkwatchConfig,
    probe: NetProbeConfig,
    target: CommandTargetConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, one variable at a time
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let stability_defaults = StabilityConfig::default();
        let stability = StabilityConfig {
            interval_secs: parse_or(
                &var,
                "LINKWATCH_STABILITY_INTERVAL",
                stability_defaults.interval_secs,
            )?,
            router_threshold: parse_or(
                &var,
                "LINKWATCH_ROUTER_THRESHOLD",
                stability_defaults.router_threshold,
            )?,
            internet_threshold: parse_or(
                &var,
                "LINKWATCH_INTERNET_THRESHOLD",
                stability_defaults.internet_threshold,
            )?,
            bridge_port_name: var("LINKWATCH_BRIDGE_PORT")
                .unwrap_or(stability_defaults.bridge_port_name),
            wan_bridge: var("LINKWATCH_WAN_BRIDGE").unwrap_or(stability_defaults.wan_bridge),
            event_channel_capacity: stability_defaults.event_channel_capacity,
        };

        let watchdog = WatchdogConfig {
            interval_secs: parse_or(
                &var,
                "LINKWATCH_WDT_INTERVAL",
                WatchdogConfig::default().interval_secs,
            )?,
        };

        let store = match var("LINKWATCH_STORE_TYPE").as_deref().unwrap_or("memory") {
            "memory" => LinkStoreConfig::Memory,
            "file" => LinkStoreConfig::File {
                path: var("LINKWATCH_STORE_PATH").context(
                    "LINKWATCH_STORE_PATH is required when LINKWATCH_STORE_TYPE=file. \
                    Set it via: export LINKWATCH_STORE_PATH=/var/lib/linkwatch/links.json",
                )?,
            },
            other => anyhow::bail!(
                "LINKWATCH_STORE_TYPE '{}' is not supported. Supported types: file, memory",
                other
            ),
        };

        let probe_defaults = NetProbeConfig::default();
        let probe = NetProbeConfig {
            router_port: parse_or(&var, "LINKWATCH_ROUTER_PORT", probe_defaults.router_port)?,
            internet_targets: var("LINKWATCH_INTERNET_TARGETS")
                .map(|value| split_list(&value))
                .unwrap_or(probe_defaults.internet_targets),
            ntp_servers: var("LINKWATCH_NTP_SERVERS")
                .map(|value| split_list(&value))
                .unwrap_or(probe_defaults.ntp_servers),
            timeout_ms: parse_or(&var, "LINKWATCH_PROBE_TIMEOUT_MS", probe_defaults.timeout_ms)?,
            ..probe_defaults
        };

        let target_defaults = CommandTargetConfig::default();
        let target = CommandTargetConfig {
            role: parse_or(&var, "LINKWATCH_ROLE", DeviceRole::default())?,
            restart_command: var("LINKWATCH_RESTART_CMD")
                .map(|value| split_argv(&value))
                .unwrap_or(target_defaults.restart_command),
            dhcp_refresh_command: var("LINKWATCH_DHCP_REFRESH_CMD")
                .map(|value| split_argv(&value))
                .unwrap_or(target_defaults.dhcp_refresh_command),
            liveness_clear_command: var("LINKWATCH_LIVENESS_CLEAR_CMD")
                .map(|value| split_argv(&value))
                .unwrap_or(target_defaults.liveness_clear_command),
            watchdog_device: var("LINKWATCH_WDT_DEVICE").map(PathBuf::from),
            watchdog_command: var("LINKWATCH_WDT_CMD")
                .map(|value| split_argv(&value))
                .unwrap_or(target_defaults.watchdog_command),
            port_lookup_command: var("LINKWATCH_PORT_LOOKUP_CMD")
                .map(|value| split_argv(&value))
                .unwrap_or(target_defaults.port_lookup_command),
        };

        Ok(Self {
            uplink_if: var("LINKWATCH_UPLINK_IF").map(|value| value.trim().to_string()),
            uplink_type: InterfaceType::from_tag(
                var("LINKWATCH_UPLINK_TYPE").as_deref().unwrap_or("eth"),
            ),
            connected: parse_or(&var, "LINKWATCH_CONNECTED", false)?,
            core: LinkwatchConfig {
                stability,
                watchdog,
                store,
            },
            probe,
            target,
            log_level: var("LINKWATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.core.validate()?;
        self.probe.validate()?;
        self.target.validate()?;

        if self.uplink_if.is_some() && self.uplink_type == InterfaceType::Other {
            anyhow::bail!("LINKWATCH_UPLINK_TYPE must be 'eth' or 'gre'");
        }

        if let LinkStoreConfig::File { path } = &self.core.store
            && let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "LINKWATCH_STORE_PATH parent directory does not exist: {}. \
                Create it first: sudo mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        if self.target.role.is_extender() && self.target.restart_command.is_empty() {
            eprintln!("WARNING: LINKWATCH_RESTART_CMD is not set; manager restarts are disabled");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "LINKWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// The link selection the supervisor starts with
    fn initial_selection(&self) -> LinkSelection {
        let mut selection = match &self.uplink_if {
            Some(if_name) => LinkSelection::with_link(if_name.clone(), self.uplink_type),
            None => LinkSelection::new(),
        };
        selection.is_connected = self.connected;
        selection
    }
}

/// Parse a variable, falling back to `default` when unset
fn parse_or<T, V>(var: &V, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, value, e)),
        None => Ok(default),
    }
}

/// Split a comma-separated list, dropping empty entries
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split a command line on whitespace
fn split_argv(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return LinkwatchExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return LinkwatchExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return LinkwatchExitCode::ConfigError.into();
    }

    info!("Starting linkwatchd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return LinkwatchExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            LinkwatchExitCode::RuntimeError
        } else {
            LinkwatchExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    info!("Device role: {:?}", config.target.role);
    info!("Link store type: {}", config.core.store.type_name());

    let store = linkwatch_core::state::create_link_store(&config.core.store)
        .await
        .context("Failed to open link store")?;

    if let Some(if_name) = &config.uplink_if {
        if store.get_record(if_name).await?.is_none() {
            info!("Creating link record for {}", if_name);
            store.insert_record(if_name, &LinkRecord::new()).await?;
        }
        info!("Monitoring uplink {} ({})", if_name, config.uplink_type.tag());
    } else {
        info!("No uplink configured");
    }

    let probe = NetProbe::new(config.probe.clone())?;
    let target = CommandTarget::new(config.target.clone())?;

    let (engine, mut events) = StabilityEngine::new(
        Box::new(probe),
        store,
        Box::new(target.clone()),
        Arc::new(target.clone()),
        config.core.stability.clone(),
    )?;
    let pinger = WatchdogPinger::new(Arc::new(target));

    let (supervisor, controller) =
        Supervisor::new(engine, pinger, config.initial_selection(), &config.core)?;
    // The uplink is fixed by configuration; nothing changes it at runtime
    drop(controller);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!("Stability event: {:?}", event);
        }
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let mut supervisor_task = tokio::spawn(supervisor.run_with_shutdown(shutdown_rx));

    info!("Daemon initialized successfully");

    tokio::select! {
        signal = wait_for_shutdown() => {
            let signal = signal?;
            info!("Received shutdown signal: {}", signal);
        }
        joined = &mut supervisor_task => {
            // The supervisor only returns on its own after a failure
            let selection = joined.context("Supervisor task panicked")??;
            warn!("Supervisor stopped unexpectedly: {:?}", selection);
            return Ok(());
        }
    }

    info!("Shutting down daemon");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, supervisor_task).await {
        Ok(joined) => {
            let selection = joined.context("Supervisor task panicked")??;
            info!(
                "Supervisor stopped (uplink: {:?}, limp: {})",
                selection.if_name, selection.is_limp_state
            );
            Ok(())
        }
        Err(_) => Err(anyhow::anyhow!(
            "Shutdown timeout after {:?}",
            SHUTDOWN_TIMEOUT
        )),
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// The name of the signal received
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
