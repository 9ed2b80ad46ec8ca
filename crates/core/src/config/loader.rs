//! Launcher configuration file loader.
//!
//! Supported formats are selected by extension:
//! - `*.yaml` / `*.yml`: YAML with camelCase keys
//! - `*.toml`: TOML with the same keys

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use nl_protocol::config_models::LauncherConfig;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Loads and validates the launcher configuration.
///
/// A `nodePath` that is a bare program name (no directory part) and does
/// not exist relative to the working directory is resolved through `PATH`.
///
/// # Arguments
///
/// * `path` - Path of the YAML or TOML configuration file
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - The file cannot be read
/// - The file has invalid syntax or an unknown extension
/// - A value is out of range (see [`validate`])
///
/// # Example
///
/// ```rust,no_run
/// use nl_core::config::load_launcher_config;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_launcher_config(Path::new("launcher-config.yaml"))?;
/// println!("Managing the {} node", config.network);
/// # Ok(())
/// # }
/// ```
pub fn load_launcher_config(path: &Path) -> ConfigResult<LauncherConfig> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let mut config: LauncherConfig = match extension.as_deref() {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
                path: path.to_path_buf(),
                source,
            })?
        }
        Some("toml") => toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?,
        _ => {
            return Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };

    resolve_node_path(&mut config, path)?;
    validate(&config, path)?;

    debug!(
        config = %path.display(),
        network = %config.network,
        node = %config.node_path.display(),
        "loaded launcher config"
    );

    Ok(config)
}

/// Checks value ranges that serde cannot express.
///
/// # Errors
///
/// Returns `ConfigError::InvalidConfig` if the network name or node path is
/// empty, the retry budget is zero, or a timeout is zero.
pub fn validate(config: &LauncherConfig, path: &Path) -> ConfigResult<()> {
    let invalid = |reason: &str| ConfigError::InvalidConfig {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if config.network.trim().is_empty() {
        return Err(invalid("network must not be empty"));
    }
    if config.node_path.as_os_str().is_empty() {
        return Err(invalid("nodePath must not be empty"));
    }
    if config.startup_max_retries == 0 {
        return Err(invalid("startupMaxRetries must be at least 1"));
    }

    let timeouts = [
        ("startupTimeoutMs", config.startup_timeout_ms),
        ("shutdownTimeoutMs", config.shutdown_timeout_ms),
        ("killTimeoutMs", config.kill_timeout_ms),
        ("updateTimeoutMs", config.update_timeout_ms),
    ];
    for (name, value) in timeouts {
        if value == 0 {
            return Err(invalid(&format!("{name} must be greater than zero")));
        }
    }

    Ok(())
}

fn resolve_node_path(config: &mut LauncherConfig, path: &Path) -> ConfigResult<()> {
    let is_bare_name = config.node_path.components().count() == 1;
    if !is_bare_name || config.node_path.exists() {
        return Ok(());
    }

    config.node_path =
        which::which(&config.node_path).map_err(|source| ConfigError::NodeNotFound {
            path: path.to_path_buf(),
            program: config.node_path.display().to_string(),
            source,
        })?;
    Ok(())
}
