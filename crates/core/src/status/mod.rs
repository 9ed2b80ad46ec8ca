//! Connectivity status caching.

pub mod cache;

pub use cache::StatusCache;
