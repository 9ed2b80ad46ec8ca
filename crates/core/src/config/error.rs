//! Errors raised while loading the launcher configuration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read launcher config {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed TOML in launcher config {path}: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Malformed YAML in launcher config {path}: {source}")]
    YamlParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// The file extension is neither YAML nor TOML.
    #[error("Unsupported config format for {path}, expected .yaml, .yml or .toml")]
    UnsupportedFormat { path: PathBuf },

    /// `nodePath` is a bare program name that is not on `PATH`.
    #[error("Node executable '{program}' named in {path} was not found in PATH: {source}")]
    NodeNotFound {
        path: PathBuf,
        program: String,
        source: which::Error,
    },

    /// A value is out of range.
    #[error("Invalid configuration in {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
