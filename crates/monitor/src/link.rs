//! Connection from the consumer to the supervisor's gateway.
//!
//! A [`GatewayLink`] sends requests and delivers the gateway's broadcast
//! events. The gateway itself is a link when both sides live in one process;
//! [`StreamLink`] speaks the JSON-lines frame protocol over any byte stream.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use nl_core::ipc::IpcGateway;
use nl_protocol::ipc::{ErrorKind, Event, Frame, Request, Response};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum LinkError {
    /// The connection to the gateway is gone.
    #[error("Gateway connection closed")]
    Closed,

    #[error("Failed to connect to gateway: {0}")]
    Connect(#[from] io::Error),

    /// The gateway answered with an error.
    #[error("Gateway rejected {request}: {message}")]
    Rejected {
        request: &'static str,
        kind: ErrorKind,
        message: String,
    },

    /// The gateway answered with a response of the wrong type.
    #[error("Unexpected response to {request}: {response:?}")]
    UnexpectedResponse {
        request: &'static str,
        response: Response,
    },
}

/// Request/response and event access to a gateway.
#[async_trait]
pub trait GatewayLink: Send + Sync {
    /// Send `request` and wait for its response.
    async fn request(&self, request: Request) -> Result<Response, LinkError>;

    /// Receive gateway events from now on.
    fn subscribe(&self) -> broadcast::Receiver<Event>;
}

#[async_trait]
impl GatewayLink for IpcGateway {
    async fn request(&self, request: Request) -> Result<Response, LinkError> {
        Ok(self.handle(request).await)
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        IpcGateway::subscribe(self)
    }
}

/// State shared between a [`StreamLink`] and its reader task.
///
/// `events` is `None` once the connection is gone, which also closes every
/// event subscription.
struct Shared {
    waiters: HashMap<u64, oneshot::Sender<Response>>,
    events: Option<broadcast::Sender<Event>>,
}

type SharedRef = Arc<Mutex<Shared>>;

/// Gateway link over a JSON-lines byte stream.
pub struct StreamLink {
    out_tx: mpsc::UnboundedSender<Frame>,
    shared: SharedRef,
    next_id: AtomicU64,
    tasks: [JoinHandle<()>; 2],
}

impl StreamLink {
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Mutex::new(Shared {
            waiters: HashMap::new(),
            events: Some(events),
        }));

        let read_task = tokio::spawn(read_frames(reader, shared.clone()));
        let write_task = tokio::spawn(write_frames(writer, out_rx));

        Self {
            out_tx,
            shared,
            next_id: AtomicU64::new(1),
            tasks: [read_task, write_task],
        }
    }

    /// Connect to a gateway served on a Unix socket.
    #[cfg(unix)]
    pub async fn connect(path: &std::path::Path) -> Result<Self, LinkError> {
        let stream = tokio::net::UnixStream::connect(path).await?;
        Ok(Self::new(stream))
    }
}

impl Drop for StreamLink {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl GatewayLink for StreamLink {
    async fn request(&self, request: Request) -> Result<Response, LinkError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut shared = lock(&self.shared);
            if shared.events.is_none() {
                return Err(LinkError::Closed);
            }
            shared.waiters.insert(id, tx);
        }

        if self.out_tx.send(Frame::Request { id, request }).is_err() {
            lock(&self.shared).waiters.remove(&id);
            return Err(LinkError::Closed);
        }

        rx.await.map_err(|_| LinkError::Closed)
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        match &lock(&self.shared).events {
            Some(events) => events.subscribe(),
            // Already closed: hand out a receiver whose sender is gone
            None => broadcast::channel(1).1,
        }
    }
}

fn lock(shared: &SharedRef) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn read_frames<R>(reader: R, shared: SharedRef)
where
    R: AsyncRead + Unpin,
{
    let mut lines = LinesStream::new(BufReader::new(reader).lines());

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "gateway connection failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Frame>(&line) {
            Ok(Frame::Response { id, response }) => {
                let waiter = lock(&shared).waiters.remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => debug!(id, "response for unknown request"),
                }
            }
            Ok(Frame::Event { event }) => {
                if let Some(events) = &lock(&shared).events {
                    let _ = events.send(event);
                }
            }
            Ok(Frame::Request { id, .. }) => warn!(id, "ignoring request sent by gateway"),
            Err(e) => warn!(error = %e, "ignoring malformed frame"),
        }
    }

    // Dropping the senders fails requests in flight and ends subscriptions
    {
        let mut shared = lock(&shared);
        shared.events = None;
        shared.waiters.clear();
    }
    debug!("gateway connection closed");
}

async fn write_frames<W>(mut writer: W, mut frames: mpsc::UnboundedReceiver<Frame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let mut line = match serde_json::to_vec(&frame) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode frame");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = writer.write_all(&line).await {
            warn!(error = %e, "failed to write to gateway");
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
}
