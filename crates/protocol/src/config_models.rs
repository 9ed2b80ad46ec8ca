//! Launcher configuration models.
//!
//! This module defines the configuration resolved once when the supervising
//! application starts. The configuration is read-only afterwards.

use serde::Deserialize;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use ts_rs::TS;

/// Immutable configuration of the managed node.
///
/// # Example
///
/// ```yaml
/// # launcher-config.yaml
/// nodePath: /usr/bin/cardano-node
/// tlsPath: /var/lib/daedalus/tls
/// logsPrefix: /var/lib/daedalus/Logs
/// network: mainnet
/// startupTimeoutMs: 5000
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct LauncherConfig {
    /// Path of the node executable.
    pub node_path: PathBuf,

    /// Directory holding the `server/` and `client/` TLS material.
    pub tls_path: PathBuf,

    /// Directory the node log file is written to.
    pub logs_prefix: PathBuf,

    /// Network name (mainnet, staging, testnet, ...).
    pub network: String,

    /// Directory for persisted launcher state. Defaults to `logs_prefix`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Port the node API should bind to. When absent the node picks one
    /// and reports it on startup.
    #[serde(default)]
    pub api_port: Option<u16>,

    /// Additional arguments appended verbatim to the node invocation.
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Time allowed for the node to report readiness.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    /// Total spawn attempts before the node is considered unrecoverable.
    #[serde(default = "default_startup_max_retries")]
    pub startup_max_retries: u32,

    /// Time allowed for a graceful shutdown before escalating to a kill.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Time allowed for the process to die after a kill.
    #[serde(default = "default_kill_timeout_ms")]
    pub kill_timeout_ms: u64,

    /// Time allowed for the node to exit after applying an update.
    #[serde(default = "default_update_timeout_ms")]
    pub update_timeout_ms: u64,

    /// Delay before restarting after the second and later crashes.
    #[serde(default = "default_crash_restart_delay_ms")]
    pub crash_restart_delay_ms: u64,

    /// Crashes tolerated in one session before giving up.
    #[serde(default = "default_max_crash_restarts")]
    pub max_crash_restarts: u32,

    /// Minimum time between two starts for non-forced restarts.
    #[serde(default = "default_restart_cooldown_ms")]
    pub restart_cooldown_ms: u64,
}

fn default_startup_timeout_ms() -> u64 {
    5_000
}

fn default_startup_max_retries() -> u32 {
    5
}

fn default_shutdown_timeout_ms() -> u64 {
    10_000
}

fn default_kill_timeout_ms() -> u64 {
    10_000
}

fn default_update_timeout_ms() -> u64 {
    60_000
}

fn default_crash_restart_delay_ms() -> u64 {
    30_000
}

fn default_max_crash_restarts() -> u32 {
    5
}

fn default_restart_cooldown_ms() -> u64 {
    5_000
}

impl LauncherConfig {
    /// Create a configuration with default timings.
    pub fn new(
        node_path: impl Into<PathBuf>,
        tls_path: impl Into<PathBuf>,
        logs_prefix: impl Into<PathBuf>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            node_path: node_path.into(),
            tls_path: tls_path.into(),
            logs_prefix: logs_prefix.into(),
            network: network.into(),
            state_dir: None,
            api_port: None,
            extra_args: Vec::new(),
            startup_timeout_ms: default_startup_timeout_ms(),
            startup_max_retries: default_startup_max_retries(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            kill_timeout_ms: default_kill_timeout_ms(),
            update_timeout_ms: default_update_timeout_ms(),
            crash_restart_delay_ms: default_crash_restart_delay_ms(),
            max_crash_restarts: default_max_crash_restarts(),
            restart_cooldown_ms: default_restart_cooldown_ms(),
        }
    }

    /// Path of the node log file.
    pub fn log_file_path(&self) -> PathBuf {
        self.logs_prefix.join("cardano-node.log")
    }

    /// Directory for persisted launcher state.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.logs_prefix.clone())
    }

    /// Storage key of the previous node pid for this network.
    pub fn pid_storage_key(&self) -> String {
        format!("{}-PREVIOUS-CARDANO-PID", self.network)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    pub fn update_timeout(&self) -> Duration {
        Duration::from_millis(self.update_timeout_ms)
    }

    pub fn crash_restart_delay(&self) -> Duration {
        Duration::from_millis(self.crash_restart_delay_ms)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.restart_cooldown_ms)
    }
}
