//! Cache of the last connectivity status pushed by the consumer.
//!
//! The consumer is the only writer and owns `has_been_connected`. A consumer
//! that restarts reads the cache to bootstrap without a network round trip.

use std::sync::{Mutex, PoisonError};

use nl_protocol::status_models::CardanoStatus;

#[derive(Debug, Default)]
pub struct StatusCache {
    status: Mutex<Option<CardanoStatus>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached status. Last write wins.
    pub fn save(&self, status: CardanoStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
    }

    /// Last saved status, or a disconnected status when nothing was saved.
    pub fn read(&self) -> CardanoStatus {
        self.cached()
            .unwrap_or_else(|| CardanoStatus::disconnected(false))
    }

    /// Last saved status as is.
    pub fn cached(&self) -> Option<CardanoStatus> {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
