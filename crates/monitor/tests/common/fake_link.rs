//! In-memory gateway link.

use async_trait::async_trait;
use nl_monitor::link::{GatewayLink, LinkError};
use nl_protocol::ipc::{Event, Request, Response};
use nl_protocol::{CardanoStatus, NodeState, TlsConfig};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

/// Gateway stand-in answering from fixed state and recording requests.
pub struct FakeLink {
    state: Mutex<NodeState>,
    tls: Mutex<Option<TlsConfig>>,
    cached: Mutex<CardanoStatus>,
    requests: Mutex<Vec<Request>>,
    restart_error: Mutex<Option<Response>>,
    events: broadcast::Sender<Event>,
}

#[allow(dead_code)]
impl FakeLink {
    pub fn new(state: NodeState, tls: Option<TlsConfig>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(state),
            tls: Mutex::new(tls),
            cached: Mutex::new(CardanoStatus::default()),
            requests: Mutex::new(Vec::new()),
            restart_error: Mutex::new(None),
            events,
        }
    }

    pub fn with_cached_status(self, status: CardanoStatus) -> Self {
        *self.cached.lock().unwrap() = status;
        self
    }

    pub fn fail_restart_with(&self, response: Response) {
        *self.restart_error.lock().unwrap() = Some(response);
    }

    /// Change the node state and TLS config, broadcasting both like the supervisor.
    pub fn transition(&self, state: NodeState, tls: Option<TlsConfig>) {
        *self.state.lock().unwrap() = state;
        *self.tls.lock().unwrap() = tls.clone();
        let _ = self.events.send(Event::StateChanged(state));
        let _ = self.events.send(Event::TlsConfigChanged(tls));
    }

    pub fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn saved_statuses(&self) -> Vec<CardanoStatus> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                Request::SaveStatus(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    /// Wait until the app subscribed and finished its bootstrap requests.
    pub async fn wait_for_requests(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(60), async {
            while self.requests.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("requests were not sent");
    }
}

#[async_trait]
impl GatewayLink for FakeLink {
    async fn request(&self, request: Request) -> Result<Response, LinkError> {
        self.requests.lock().unwrap().push(request.clone());

        let response = match request {
            Request::GetState => Response::State(*self.state.lock().unwrap()),
            Request::GetTlsConfig => Response::TlsConfig(self.tls.lock().unwrap().clone()),
            Request::GetStatus => Response::Status(*self.cached.lock().unwrap()),
            Request::SaveStatus(status) => {
                *self.cached.lock().unwrap() = status;
                Response::Status(status)
            }
            Request::Restart { .. } => self
                .restart_error
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Response::Done),
            Request::SetFault { .. } | Request::AwaitUpdate => Response::Done,
            Request::GetFaults => Response::Faults(Vec::new()),
        };
        Ok(response)
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}
