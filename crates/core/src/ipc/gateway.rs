//! Request handlers and event broadcasting.
//!
//! Every [`Request`] is answered with exactly one [`Response`]; failures are
//! reported as [`Response::Error`] and never tear down the gateway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nl_protocol::ipc::{Event, Request, Response, UPDATE_EXIT_CODE};
use nl_protocol::node_models::{NodeState, TlsConfig};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info};

use crate::error::NodeError;
use crate::state::{Broadcaster, NodeSupervisor};
use crate::status::StatusCache;

const EVENT_CAPACITY: usize = 64;

/// Fan-out of [`Event`]s to every subscriber.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Send `event` to current subscribers. Events without subscribers are dropped.
    pub fn publish(&self, event: Event) {
        debug!(channel = %event.channel(), "broadcasting event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster for EventBus {
    fn broadcast_state(&self, state: NodeState) {
        self.publish(Event::StateChanged(state));
    }

    fn broadcast_tls_config(&self, config: Option<TlsConfig>) {
        self.publish(Event::TlsConfigChanged(config));
    }
}

/// Gateway exposing the supervisor to consumers.
///
/// The same [`EventBus`] must be given to the supervisor as its
/// [`Broadcaster`] so that state changes reach subscribers.
#[derive(Clone)]
pub struct IpcGateway {
    supervisor: NodeSupervisor,
    cache: Arc<StatusCache>,
    bus: EventBus,
    exit_tx: Arc<watch::Sender<Option<i32>>>,
    awaiting_update: Arc<AtomicBool>,
}

impl IpcGateway {
    pub fn new(supervisor: NodeSupervisor, bus: EventBus) -> Self {
        let (exit_tx, _) = watch::channel(None);
        Self {
            supervisor,
            cache: Arc::new(StatusCache::new()),
            bus,
            exit_tx: Arc::new(exit_tx),
            awaiting_update: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn supervisor(&self) -> &NodeSupervisor {
        &self.supervisor
    }

    pub fn status_cache(&self) -> &StatusCache {
        &self.cache
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Exit code requested by the gateway, set once an update was applied.
    pub fn exit_requests(&self) -> watch::Receiver<Option<i32>> {
        self.exit_tx.subscribe()
    }

    /// Answer one request.
    pub async fn handle(&self, request: Request) -> Response {
        debug!(channel = %request.channel(), ?request, "handling request");

        match request {
            Request::GetState => Response::State(self.supervisor.state()),
            Request::GetTlsConfig => Response::TlsConfig(self.supervisor.tls_config()),
            Request::GetStatus => Response::Status(self.cache.read()),
            Request::SaveStatus(status) => {
                self.cache.save(status);
                Response::Status(self.cache.read())
            }
            Request::Restart { forced } => {
                info!(forced, "restart requested");
                match self.supervisor.restart(forced).await {
                    Ok(()) => Response::Done,
                    Err(e) => error_response(&e),
                }
            }
            Request::SetFault { fault, enabled } => {
                self.supervisor.set_fault(fault, enabled);
                Response::Done
            }
            Request::GetFaults => Response::Faults(self.supervisor.active_faults()),
            Request::AwaitUpdate => {
                self.await_update();
                Response::Done
            }
        }
    }

    /// Watch for the node update in the background.
    ///
    /// A second request while one is pending is acknowledged without
    /// starting another watch.
    fn await_update(&self) {
        if self.awaiting_update.swap(true, Ordering::SeqCst) {
            debug!("update already awaited");
            return;
        }

        info!("awaiting node update");
        let gateway = self.clone();
        tokio::spawn(async move {
            match gateway.supervisor.expect_node_update().await {
                Ok(()) => {
                    info!(code = UPDATE_EXIT_CODE, "node updated, requesting exit");
                    gateway.bus.publish(Event::ExitRequested {
                        code: UPDATE_EXIT_CODE,
                    });
                    gateway.exit_tx.send_replace(Some(UPDATE_EXIT_CODE));
                }
                Err(e) => {
                    error!(error = %e, "node update failed");
                    gateway.awaiting_update.store(false, Ordering::SeqCst);
                }
            }
        });
    }
}

fn error_response(err: &NodeError) -> Response {
    Response::error(err.kind(), err.to_string())
}
