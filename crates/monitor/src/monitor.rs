//! Remote status monitor.
//!
//! [`StatusMonitor`] polls a [`NetworkStatusSource`] while TLS config for the
//! node is available and derives the node's connectivity from the answers.
//! Regular polls run every `poll_interval`; a forced NTP time check runs every
//! `ntp_check_interval` and takes priority over regular polls.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nl_protocol::{CardanoStatus, TlsConfig};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::source::NetworkStatusSource;
use crate::status::{self, NetworkSnapshot, SyncStage};

const EVENT_CAPACITY: usize = 16;

/// Connectivity transitions worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    /// The node subscribed to the network for the first time.
    Connected,
    /// The node caught up with the network for the first time.
    Synced,
    ConnectionLost,
    ConnectionRestored,
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No TLS config, or a forced time check is running.
    Skipped,
    Updated,
    /// The request failed and the node is considered disconnected.
    Failed,
    /// The TLS config was cleared while the request was in flight.
    Discarded,
}

/// Everything the monitor currently knows about the node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub status: CardanoStatus,
    pub stage: SyncStage,
    pub is_connected: bool,
    pub is_synced: bool,
    pub is_system_time_correct: bool,
    pub time_difference_us: Option<i64>,
    pub local_height: u64,
    pub network_height: u64,
    pub sync_progress: Option<f64>,
    pub sync_percentage: f64,
}

struct Tracking {
    status: CardanoStatus,
    stage: SyncStage,
    is_time_correct: bool,
    ignore_system_time: bool,
    time_difference_us: Option<i64>,
    initial_local_height: Option<u64>,
    local_height: u64,
    network_height: u64,
    sync_progress: Option<f64>,
    most_recent_block: Instant,
}

impl Tracking {
    fn is_system_time_correct(&self) -> bool {
        self.is_time_correct || self.ignore_system_time
    }

    fn is_synced(&self) -> bool {
        self.status.is_connected() && self.status.is_node_in_sync && self.is_system_time_correct()
    }

    /// Record a connectivity change and report it.
    fn connection_changed(&mut self, was_connected: bool, events: &mut Vec<MonitorEvent>) {
        let is_connected = self.status.is_connected();
        if was_connected == is_connected {
            return;
        }

        if !is_connected {
            self.status.has_been_connected = true;
            warn!("Connection lost");
            events.push(MonitorEvent::ConnectionLost);
        } else if self.status.has_been_connected {
            info!("Connection restored");
            events.push(MonitorEvent::ConnectionRestored);
        }
    }
}

/// Polls the node's network status and derives its connectivity.
pub struct StatusMonitor {
    config: MonitorConfig,
    source: Arc<dyn NetworkStatusSource>,
    tls: Mutex<Option<TlsConfig>>,
    tracking: Mutex<Tracking>,
    forced_check: tokio::sync::Mutex<()>,
    status_tx: watch::Sender<CardanoStatus>,
    events: broadcast::Sender<MonitorEvent>,
    created_at: Instant,
}

impl StatusMonitor {
    pub fn new(config: MonitorConfig, source: Arc<dyn NetworkStatusSource>) -> Self {
        let now = Instant::now();
        let tracking = Tracking {
            status: CardanoStatus::default(),
            stage: SyncStage::Connecting,
            is_time_correct: true,
            ignore_system_time: config.ignore_system_time,
            time_difference_us: None,
            initial_local_height: None,
            local_height: 0,
            network_height: 0,
            sync_progress: None,
            most_recent_block: now,
        };
        let (status_tx, _) = watch::channel(CardanoStatus::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            config,
            source,
            tls: Mutex::new(None),
            tracking: Mutex::new(tracking),
            forced_check: tokio::sync::Mutex::new(()),
            status_tx,
            events,
            created_at: now,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn tls_config(&self) -> Option<TlsConfig> {
        self.tls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the TLS config. Polling only happens while one is set.
    pub fn set_tls_config(&self, config: Option<TlsConfig>) {
        *self.tls.lock().unwrap_or_else(PoisonError::into_inner) = config;
    }

    pub fn status(&self) -> CardanoStatus {
        self.tracking().status
    }

    pub fn stage(&self) -> SyncStage {
        self.tracking().stage
    }

    pub fn is_connected(&self) -> bool {
        self.tracking().status.is_connected()
    }

    /// Connected, in sync and with a trustworthy clock.
    pub fn is_synced(&self) -> bool {
        self.tracking().is_synced()
    }

    pub fn is_system_time_correct(&self) -> bool {
        self.tracking().is_system_time_correct()
    }

    pub fn sync_percentage(&self) -> f64 {
        let tracking = self.tracking();
        status::sync_percentage(tracking.local_height, tracking.network_height)
    }

    /// Height of the local chain at the first successful poll.
    pub fn initial_local_height(&self) -> Option<u64> {
        self.tracking().initial_local_height
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let tracking = self.tracking();
        MonitorSnapshot {
            status: tracking.status,
            stage: tracking.stage,
            is_connected: tracking.status.is_connected(),
            is_synced: tracking.is_synced(),
            is_system_time_correct: tracking.is_system_time_correct(),
            time_difference_us: tracking.time_difference_us,
            local_height: tracking.local_height,
            network_height: tracking.network_height,
            sync_progress: tracking.sync_progress,
            sync_percentage: status::sync_percentage(
                tracking.local_height,
                tracking.network_height,
            ),
        }
    }

    /// Watch the connectivity booleans.
    pub fn subscribe_status(&self) -> watch::Receiver<CardanoStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Treat the system time as correct from now on.
    pub fn ignore_system_time_checks(&self) {
        info!("Ignoring system time checks");
        self.tracking().ignore_system_time = true;
    }

    /// Adopt a status cached by the supervisor, e.g. after a consumer restart.
    pub fn restore(&self, status: CardanoStatus) {
        debug!(?status, "Restoring cached status");
        self.tracking().status = status;
        self.publish(Vec::new());
    }

    /// Mark the node as unreachable.
    pub fn set_disconnected(&self) {
        let was_connected = self.is_connected();
        self.disconnect(was_connected);
    }

    /// Poll the node once.
    pub async fn update(&self, force_ntp_check: bool) -> PollOutcome {
        let Some(tls) = self.tls_config() else {
            return PollOutcome::Skipped;
        };

        let _forced = if force_ntp_check {
            let guard = self.forced_check.lock().await;
            debug!("Forcing NTP time check");
            self.tracking().most_recent_block = Instant::now() + self.config.request_timeout;
            Some(guard)
        } else {
            if self.forced_check.try_lock().is_err() {
                debug!("Time check in progress, skipping poll");
                return PollOutcome::Skipped;
            }
            None
        };

        let was_connected = self.is_connected();
        let result = self.source.fetch(&tls, force_ntp_check).await;

        if self.tls_config().is_none() {
            debug!("TLS config cleared during poll, discarding result");
            return PollOutcome::Discarded;
        }

        match result {
            Ok(snapshot) => {
                self.apply(&snapshot, was_connected);
                PollOutcome::Updated
            }
            Err(e) => {
                debug!(error = %e, "Network status poll failed");
                self.disconnect(was_connected);
                PollOutcome::Failed
            }
        }
    }

    /// Poll until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut poll = time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let first_time_check = Instant::now() + self.config.ntp_check_interval;
        let mut time_check = time::interval_at(first_time_check, self.config.ntp_check_interval);
        time_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.update(false).await;
                }
                _ = time_check.tick() => {
                    // Runs beside regular polls, which skip while it is in flight
                    let monitor = Arc::clone(&self);
                    tokio::spawn(async move {
                        monitor.update(true).await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Status monitor stopped");
    }

    fn apply(&self, snapshot: &NetworkSnapshot, was_connected: bool) {
        let now = Instant::now();
        let mut events = Vec::new();
        {
            let mut tracking = self.tracking();
            let tracking = &mut *tracking;

            tracking.status.is_node_responding = true;
            tracking.status.is_node_subscribed = snapshot.is_subscribed;
            tracking.time_difference_us = snapshot.time_difference_us;
            tracking.is_time_correct = status::is_time_correct(
                snapshot.time_difference_us,
                self.config.allowed_time_difference_us,
            );
            tracking.sync_progress = Some(snapshot.sync_progress);

            if tracking.initial_local_height.is_none() {
                tracking.initial_local_height = Some(snapshot.local_height);
            }
            tracking.local_height = snapshot.local_height;

            let network_height = snapshot.network_height.unwrap_or(0);
            let has_started_receiving_blocks = network_height > 0;
            let is_increasing =
                has_started_receiving_blocks && network_height > tracking.network_height;
            tracking.network_height = network_height;

            if is_increasing
                || tracking.most_recent_block > now
                || (!tracking.is_time_correct && !tracking.ignore_system_time)
            {
                tracking.most_recent_block = now;
            }
            let is_stalling =
                now.duration_since(tracking.most_recent_block) > self.config.max_allowed_stall;

            tracking.status.is_node_syncing =
                status::is_syncing(has_started_receiving_blocks, is_increasing, is_stalling);
            tracking.status.is_node_in_sync = status::is_in_sync(
                tracking.status.is_node_syncing,
                network_height,
                snapshot.local_height,
                self.config.unsynced_blocks_allowed,
            );

            let stage = status::next_stage(
                tracking.stage,
                snapshot.is_subscribed,
                tracking.status.is_node_in_sync,
            );
            if stage != tracking.stage {
                let elapsed_ms = self.created_at.elapsed().as_millis() as u64;
                match stage {
                    SyncStage::Syncing => {
                        info!(elapsed_ms, "Connected to network");
                        events.push(MonitorEvent::Connected);
                    }
                    SyncStage::Running => {
                        info!(elapsed_ms, "Node in sync with network");
                        events.push(MonitorEvent::Synced);
                    }
                    SyncStage::Connecting => {}
                }
                tracking.stage = stage;
            }

            tracking.connection_changed(was_connected, &mut events);

            debug!(
                network_height,
                local_height = snapshot.local_height,
                is_increasing,
                is_stalling,
                status = ?tracking.status,
                "Network status updated"
            );
        }
        self.publish(events);
    }

    fn disconnect(&self, was_connected: bool) {
        let mut events = Vec::new();
        {
            let mut tracking = self.tracking();
            let status = &mut tracking.status;
            status.is_node_responding = false;
            status.is_node_subscribed = false;
            status.is_node_syncing = false;
            status.is_node_in_sync = false;
            tracking.connection_changed(was_connected, &mut events);
        }
        self.publish(events);
    }

    fn publish(&self, events: Vec<MonitorEvent>) {
        let status = self.status();
        self.status_tx.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
        for event in events {
            let _ = self.events.send(event);
        }
    }

    fn tracking(&self) -> MutexGuard<'_, Tracking> {
        self.tracking.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
