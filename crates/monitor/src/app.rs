//! Consumer event loop.
//!
//! [`MonitorApp`] wires a [`StatusMonitor`] to the supervisor's gateway: it
//! follows node state and TLS broadcasts to decide when the monitor may poll,
//! and reports every connected status change back to the gateway's cache.

use std::sync::Arc;

use nl_protocol::ipc::{Event, Request, Response};
use nl_protocol::{CardanoStatus, NodeState, TlsConfig};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::error::MonitorError;
use crate::link::{GatewayLink, LinkError};
use crate::monitor::StatusMonitor;

/// Consumer side of the gateway.
pub struct MonitorApp<L> {
    link: Arc<L>,
    monitor: Arc<StatusMonitor>,
    node_state: Option<NodeState>,
    last_reported: Option<CardanoStatus>,
}

impl<L: GatewayLink + 'static> MonitorApp<L> {
    pub fn new(link: Arc<L>, monitor: Arc<StatusMonitor>) -> Self {
        Self {
            link,
            monitor,
            node_state: None,
            last_reported: None,
        }
    }

    pub fn monitor(&self) -> &Arc<StatusMonitor> {
        &self.monitor
    }

    /// Last node state seen by the consumer.
    pub fn node_state(&self) -> Option<NodeState> {
        self.node_state
    }

    /// Fetch the node state and the cached status from the gateway.
    pub async fn bootstrap(&mut self) -> Result<(), MonitorError> {
        self.resync_state().await?;

        match self.link.request(Request::GetStatus).await? {
            Response::Status(status) => {
                self.monitor.restore(status);
                self.last_reported = Some(status);
            }
            response => return Err(unexpected("getStatus", response)),
        }
        Ok(())
    }

    /// Re-fetch the node state, and the TLS config when the node is running.
    async fn resync_state(&mut self) -> Result<(), MonitorError> {
        match self.link.request(Request::GetState).await? {
            Response::State(state) => {
                self.node_state = None;
                self.handle_state(state).await;
                Ok(())
            }
            response => Err(unexpected("getState", response)),
        }
    }

    /// Ask the supervisor for a forced restart of the node.
    pub async fn restart_node(&self) -> Result<(), MonitorError> {
        info!("Requesting node restart");
        match self.link.request(Request::Restart { forced: true }).await? {
            Response::Done => Ok(()),
            response => Err(unexpected("restart", response)),
        }
    }

    /// Run until the gateway asks the consumer to exit, the link closes, or
    /// `shutdown` flips to `true`.
    ///
    /// Returns the exit code requested by the gateway, if any.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<Option<i32>, MonitorError> {
        let mut events = self.link.subscribe();
        let mut status_rx = self.monitor.subscribe_status();
        self.bootstrap().await?;

        let poller = tokio::spawn(Arc::clone(&self.monitor).run(shutdown.clone()));

        let exit_code = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(Event::StateChanged(state)) => self.handle_state(state).await,
                    Ok(Event::TlsConfigChanged(config)) => self.handle_tls_config(config),
                    Ok(Event::ExitRequested { code }) => {
                        info!(code, "Gateway requested exit");
                        break Some(code);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Missed gateway events, re-fetching state");
                        if let Err(e) = self.resync_state().await {
                            error!(error = %e, "Failed to re-fetch state");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Gateway link closed");
                        break None;
                    }
                },
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break None;
                    }
                    self.report_status().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break None;
                    }
                }
            }
        };

        poller.abort();
        Ok(exit_code)
    }

    async fn handle_state(&mut self, state: NodeState) {
        if self.node_state == Some(state) {
            return;
        }
        debug!(%state, "Node state changed");
        self.node_state = Some(state);

        match state {
            NodeState::Running => {
                if let Err(e) = self.request_tls_config().await {
                    error!(error = %e, "Failed to fetch TLS config");
                }
            }
            NodeState::Starting => {}
            state if state.is_shutting_down() => {
                self.monitor.set_tls_config(None);
                self.monitor.set_disconnected();
            }
            _ => self.monitor.set_disconnected(),
        }
    }

    async fn request_tls_config(&mut self) -> Result<(), MonitorError> {
        match self.link.request(Request::GetTlsConfig).await? {
            Response::TlsConfig(config) => {
                self.handle_tls_config(config);
                Ok(())
            }
            response => Err(unexpected("getTlsConfig", response)),
        }
    }

    fn handle_tls_config(&mut self, config: Option<TlsConfig>) {
        let Some(config) = config else {
            return;
        };
        if self.monitor.tls_config().as_ref() == Some(&config) {
            return;
        }

        info!(port = config.port, "Received TLS config");
        self.monitor.set_tls_config(Some(config));

        // Poll right away instead of waiting for the next tick
        let monitor = Arc::clone(&self.monitor);
        tokio::spawn(async move {
            monitor.update(false).await;
        });
    }

    async fn report_status(&mut self) {
        let status = self.monitor.status();
        if !status.is_connected() || self.last_reported == Some(status) {
            return;
        }

        match self.link.request(Request::SaveStatus(status)).await {
            Ok(Response::Error { kind, message }) => {
                warn!(?kind, %message, "Gateway rejected status");
            }
            Ok(_) => {
                debug!(?status, "Reported status");
                self.last_reported = Some(status);
            }
            Err(e) => warn!(error = %e, "Failed to report status"),
        }
    }
}

fn unexpected(request: &'static str, response: Response) -> MonitorError {
    let err = match response {
        Response::Error { kind, message } => LinkError::Rejected {
            request,
            kind,
            message,
        },
        response => LinkError::UnexpectedResponse { request, response },
    };
    err.into()
}
