//! Network status sources.
//!
//! The monitor asks a [`NetworkStatusSource`] for the node's view of the
//! network. [`HttpStatusSource`] queries the node API over mutually
//! authenticated TLS using the material published by the supervisor.

use async_trait::async_trait;
use nl_protocol::TlsConfig;
use reqwest::{Certificate, Client, Identity};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::error::MonitorError;
use crate::status::NetworkSnapshot;

/// Path of the node info endpoint.
pub const NODE_INFO_PATH: &str = "/api/v1/node-info";

/// Provider of network status snapshots.
#[async_trait]
pub trait NetworkStatusSource: Send + Sync {
    /// Query the node reachable with `tls`.
    ///
    /// With `force_ntp_check` the node re-checks its clock against NTP
    /// before answering, which may take considerably longer.
    async fn fetch(
        &self,
        tls: &TlsConfig,
        force_ntp_check: bool,
    ) -> Result<NetworkSnapshot, MonitorError>;
}

#[derive(Deserialize)]
struct Envelope {
    data: NodeInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeInfo {
    sync_progress: Quantity<f64>,
    blockchain_height: Option<Quantity<u64>>,
    local_blockchain_height: Quantity<u64>,
    local_time_information: LocalTimeInformation,
    #[serde(default)]
    subscription_status: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalTimeInformation {
    difference_from_ntp_server: Option<Quantity<i64>>,
}

#[derive(Deserialize)]
struct Quantity<T> {
    quantity: T,
}

/// Parse a node info response body.
pub fn parse_node_info(body: &[u8]) -> Result<NetworkSnapshot, serde_json::Error> {
    let Envelope { data } = serde_json::from_slice(body)?;

    Ok(NetworkSnapshot {
        sync_progress: data.sync_progress.quantity,
        network_height: data.blockchain_height.map(|height| height.quantity),
        local_height: data.local_blockchain_height.quantity,
        time_difference_us: data
            .local_time_information
            .difference_from_ntp_server
            .map(|difference| difference.quantity),
        is_subscribed: data
            .subscription_status
            .values()
            .any(|status| status == "subscribed"),
    })
}

/// Node API client over HTTPS.
///
/// The underlying client is rebuilt whenever the TLS config changes.
pub struct HttpStatusSource {
    request_timeout: Duration,
    client: Mutex<Option<(TlsConfig, Client)>>,
}

impl HttpStatusSource {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            client: Mutex::new(None),
        }
    }

    fn client_for(&self, tls: &TlsConfig) -> Result<Client, MonitorError> {
        let mut cached = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((config, client)) = cached.as_ref() {
            if config == tls {
                return Ok(client.clone());
            }
        }

        debug!(port = tls.port, "Building node API client");
        let client = build_client(tls, self.request_timeout)?;
        *cached = Some((tls.clone(), client.clone()));
        Ok(client)
    }
}

fn build_client(tls: &TlsConfig, request_timeout: Duration) -> Result<Client, MonitorError> {
    let ca = Certificate::from_pem(&tls.ca)?;

    let mut identity_pem = tls.cert.clone();
    identity_pem.push(b'\n');
    identity_pem.extend_from_slice(&tls.key);
    let identity = Identity::from_pem(&identity_pem)?;

    let client = Client::builder()
        .use_rustls_tls()
        .add_root_certificate(ca)
        .identity(identity)
        .timeout(request_timeout)
        .build()?;
    Ok(client)
}

#[async_trait]
impl NetworkStatusSource for HttpStatusSource {
    async fn fetch(
        &self,
        tls: &TlsConfig,
        force_ntp_check: bool,
    ) -> Result<NetworkSnapshot, MonitorError> {
        let client = self.client_for(tls)?;

        let mut url = format!("https://localhost:{}{NODE_INFO_PATH}", tls.port);
        if force_ntp_check {
            url.push_str("?force_ntp_check=true");
        }

        let response = client.get(&url).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        Ok(parse_node_info(&body)?)
    }
}
