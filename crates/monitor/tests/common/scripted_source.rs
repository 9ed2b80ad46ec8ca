//! Scripted network status source and fixtures.

use async_trait::async_trait;
use nl_monitor::link::LinkError;
use nl_monitor::source::NetworkStatusSource;
use nl_monitor::status::NetworkSnapshot;
use nl_monitor::MonitorError;
use nl_protocol::TlsConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Answers every poll with the current scripted snapshot.
pub struct ScriptedSource {
    answer: Mutex<Option<NetworkSnapshot>>,
    ports: Mutex<Vec<u16>>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new(answer: Option<NetworkSnapshot>) -> Self {
        Self {
            answer: Mutex::new(answer),
            ports: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn answer_with(&self, answer: Option<NetworkSnapshot>) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Ports of the TLS configs used so far.
    pub fn ports(&self) -> Vec<u16> {
        self.ports.lock().unwrap().clone()
    }
}

#[async_trait]
impl NetworkStatusSource for ScriptedSource {
    async fn fetch(
        &self,
        tls: &TlsConfig,
        _force_ntp_check: bool,
    ) -> Result<NetworkSnapshot, MonitorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ports.lock().unwrap().push(tls.port);
        self.answer
            .lock()
            .unwrap()
            .clone()
            .ok_or(MonitorError::Link(LinkError::Closed))
    }
}

/// Subscribed node at the network tip.
#[allow(dead_code)]
pub fn synced_node(network_height: u64) -> NetworkSnapshot {
    NetworkSnapshot {
        sync_progress: 100.0,
        network_height: Some(network_height),
        local_height: network_height,
        time_difference_us: Some(500),
        is_subscribed: true,
    }
}

#[allow(dead_code)]
pub fn tls_config(port: u16) -> TlsConfig {
    TlsConfig {
        port,
        ca: b"ca".to_vec(),
        cert: b"cert".to_vec(),
        key: b"key".to_vec(),
    }
}
