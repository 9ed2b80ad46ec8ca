//! # nl-monitor
//!
//! Consumer side of node-launcher. It follows the supervisor's state and TLS
//! broadcasts, polls the running node's API and reports connectivity back.
//!
//! ## Modules
//!
//! - [`config`]: Polling intervals and thresholds
//! - [`status`]: Pure connectivity and sync computations
//! - [`source`]: Network status source (HTTPS node API)
//! - [`link`]: Connection to the supervisor's IPC gateway
//! - [`monitor`]: The polling status monitor
//! - [`app`]: Consumer event loop tying the above together

pub mod app;
pub mod config;
pub mod error;
pub mod link;
pub mod monitor;
pub mod source;
pub mod status;

pub use app::MonitorApp;
pub use config::MonitorConfig;
pub use error::MonitorError;
pub use monitor::{MonitorEvent, StatusMonitor};
