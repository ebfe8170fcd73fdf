// # Command Device Target
//
// This crate provides a DeviceTarget and a Topology backed by external
// commands, plus a kernel watchdog device.
//
// ## Commands
//
// Every action is an argv list run directly (no shell). Placeholders are
// substituted per argument before spawning:
//
// - `{ifname}`: interface for DHCP refresh
// - `{port}`: port name for the topology lookup
//
// An empty argv disables the action.
//
// ## Port Lookup
//
// The lookup command follows `ovs-vsctl port-to-br` conventions:
// exit 0 means the port exists, exit 1 means it does not, and anything
// else is a lookup failure.
//
// ## Watchdog
//
// With a watchdog device configured, each ping writes one keepalive byte to
// the device, which stays open across pings. Closing a Linux watchdog device
// without the magic close character leaves the timer armed, so the handle
// is only dropped after a failed write and reopened on the next ping.

use linkwatch_core::config::DeviceRole;
use linkwatch_core::traits::{DeviceTarget, Topology};
use linkwatch_core::{Error, Result};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;

/// Placeholder replaced with the interface name
pub const IFNAME_PLACEHOLDER: &str = "{ifname}";

/// Placeholder replaced with the port name
pub const PORT_PLACEHOLDER: &str = "{port}";

/// Byte written to the watchdog device on every ping
const WATCHDOG_KEEPALIVE: &[u8] = b"k";

/// Configuration for [`CommandTarget`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandTargetConfig {
    /// Device operating role
    #[serde(default)]
    pub role: DeviceRole,

    /// Restarts the connectivity managers
    #[serde(default)]
    pub restart_command: Vec<String>,

    /// Renews the DHCP lease of `{ifname}`
    #[serde(default = "default_dhcp_refresh_command")]
    pub dhcp_refresh_command: Vec<String>,

    /// Clears the externally visible link status
    #[serde(default)]
    pub liveness_clear_command: Vec<String>,

    /// Kernel watchdog device, e.g. `/dev/watchdog`
    #[serde(default)]
    pub watchdog_device: Option<PathBuf>,

    /// Feeds the watchdog when no device is configured
    #[serde(default)]
    pub watchdog_command: Vec<String>,

    /// Exits 0 when `{port}` exists, 1 when it does not
    #[serde(default = "default_port_lookup_command")]
    pub port_lookup_command: Vec<String>,
}

fn default_dhcp_refresh_command() -> Vec<String> {
    vec![
        "udhcpc".to_string(),
        "-i".to_string(),
        IFNAME_PLACEHOLDER.to_string(),
        "-n".to_string(),
        "-q".to_string(),
    ]
}

fn default_port_lookup_command() -> Vec<String> {
    vec![
        "ovs-vsctl".to_string(),
        "port-to-br".to_string(),
        PORT_PLACEHOLDER.to_string(),
    ]
}

impl Default for CommandTargetConfig {
    fn default() -> Self {
        Self {
            role: DeviceRole::default(),
            restart_command: Vec::new(),
            dhcp_refresh_command: default_dhcp_refresh_command(),
            liveness_clear_command: Vec::new(),
            watchdog_device: None,
            watchdog_command: Vec::new(),
            port_lookup_command: default_port_lookup_command(),
        }
    }
}

impl CommandTargetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.port_lookup_command.is_empty() {
            return Err(Error::config("Port lookup command must not be empty"));
        }
        if self.watchdog_device.is_some() && !self.watchdog_command.is_empty() {
            return Err(Error::config(
                "Configure either a watchdog device or a watchdog command, not both",
            ));
        }
        Ok(())
    }
}

/// Device target that shells out for every action
#[derive(Debug, Clone)]
pub struct CommandTarget {
    config: Arc<CommandTargetConfig>,
    watchdog: Arc<Mutex<Option<File>>>,
}

impl CommandTarget {
    pub fn new(config: CommandTargetConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            watchdog: Arc::new(Mutex::new(None)),
        })
    }

    /// Run an action and log its failure
    async fn run_action(&self, what: &str, argv: &[String], placeholder: &str, value: &str) {
        if argv.is_empty() {
            tracing::debug!("No command configured to {}", what);
            return;
        }

        match run_command(argv, placeholder, value).await {
            Ok(status) if status.success() => tracing::debug!("Command to {} succeeded", what),
            Ok(status) => tracing::error!("Command to {} failed: {}", what, status),
            Err(e) => tracing::error!("Command to {} could not run: {}", what, e),
        }
    }

    async fn feed_watchdog_device(&self, path: &Path) {
        let mut guard = self.watchdog.lock().await;

        if guard.is_none() {
            match OpenOptions::new().write(true).open(path).await {
                Ok(file) => {
                    tracing::info!("Opened watchdog device {}", path.display());
                    *guard = Some(file);
                }
                Err(e) => {
                    tracing::error!("Failed to open watchdog device {}: {}", path.display(), e);
                    return;
                }
            }
        }

        if let Some(file) = guard.as_mut() {
            let result = async {
                file.write_all(WATCHDOG_KEEPALIVE).await?;
                file.flush().await
            }
            .await;

            if let Err(e) = result {
                tracing::error!("Failed to ping watchdog {}: {}", path.display(), e);
                *guard = None;
            }
        }
    }
}

#[async_trait::async_trait]
impl DeviceTarget for CommandTarget {
    fn is_extender(&self) -> bool {
        self.config.role.is_extender()
    }

    async fn restart_managers(&self) {
        self.run_action("restart managers", &self.config.restart_command, "", "")
            .await;
    }

    async fn refresh_dhcp(&self, if_name: &str) {
        let what = format!("refresh DHCP on {}", if_name);
        self.run_action(
            &what,
            &self.config.dhcp_refresh_command,
            IFNAME_PLACEHOLDER,
            if_name,
        )
        .await;
    }

    async fn ping_watchdog(&self) {
        match &self.config.watchdog_device {
            Some(path) => self.feed_watchdog_device(path).await,
            None => {
                self.run_action("ping watchdog", &self.config.watchdog_command, "", "")
                    .await
            }
        }
    }

    async fn clear_liveness_indicator(&self) {
        self.run_action(
            "clear liveness indicator",
            &self.config.liveness_clear_command,
            "",
            "",
        )
        .await;
    }
}

#[async_trait::async_trait]
impl Topology for CommandTarget {
    async fn port_exists(&self, port_name: &str) -> Result<bool> {
        let status = run_command(&self.config.port_lookup_command, PORT_PLACEHOLDER, port_name)
            .await
            .map_err(|e| Error::topology(format!("Port lookup for {} failed: {}", port_name, e)))?;

        match status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(Error::topology(format!(
                "Port lookup for {} exited with {}",
                port_name, status
            ))),
        }
    }
}

/// Substitute `placeholder` in every argument
fn expand_argv(argv: &[String], placeholder: &str, value: &str) -> Vec<String> {
    if placeholder.is_empty() {
        return argv.to_vec();
    }
    argv.iter().map(|arg| arg.replace(placeholder, value)).collect()
}

/// Spawn a command and wait for it to exit
async fn run_command(argv: &[String], placeholder: &str, value: &str) -> Result<ExitStatus> {
    let argv = expand_argv(argv, placeholder, value);
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::config("Empty command"))?;

    tracing::trace!("Running {} {:?}", program, args);
    let status = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .status()
        .await?;
    Ok(status)
}
