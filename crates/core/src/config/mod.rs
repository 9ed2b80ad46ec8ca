//! Configuration loading and validation.
//!
//! The launcher configuration is resolved once when the supervising
//! application starts and is read-only afterwards.

pub mod error;
pub mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::load_launcher_config;
