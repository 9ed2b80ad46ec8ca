//! JSON-lines transport.
//!
//! Each line on the wire is one [`Frame`]. Requests are handled concurrently
//! and answered with a `Response` frame carrying the request id; every event
//! on the gateway's bus is forwarded as an `Event` frame.

use std::io;

use nl_protocol::ipc::{Event, Frame};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, LinesStream};
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::ipc::gateway::IpcGateway;

/// Serve one consumer connection until it closes.
///
/// # Errors
///
/// Returns the IO error that broke the connection.
pub async fn serve_connection<S>(gateway: IpcGateway, stream: S) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Frame>();
    let writer_task = tokio::spawn(write_frames(writer, out_rx));

    let mut lines = LinesStream::new(BufReader::new(reader).lines());
    let mut events = BroadcastStream::new(gateway.subscribe());

    let result = loop {
        tokio::select! {
            line = lines.next() => match line {
                Some(Ok(line)) => dispatch_line(&gateway, &out_tx, &line),
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            },
            event = events.next() => match event {
                Some(Ok(event)) => {
                    let _ = out_tx.send(Frame::Event { event });
                }
                Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                    warn!(missed, "consumer fell behind, resending current state");
                    resend_snapshot(&gateway, &out_tx);
                }
                None => break Ok(()),
            },
        }
    };

    debug!("consumer connection closed");
    writer_task.abort();
    result
}

fn dispatch_line(gateway: &IpcGateway, out_tx: &mpsc::UnboundedSender<Frame>, line: &str) {
    if line.trim().is_empty() {
        return;
    }

    match serde_json::from_str::<Frame>(line) {
        Ok(Frame::Request { id, request }) => {
            let gateway = gateway.clone();
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                let response = gateway.handle(request).await;
                let _ = out_tx.send(Frame::Response { id, response });
            });
        }
        Ok(other) => warn!(?other, "ignoring frame that is not a request"),
        Err(e) => warn!(error = %e, "ignoring malformed frame"),
    }
}

fn resend_snapshot(gateway: &IpcGateway, out_tx: &mpsc::UnboundedSender<Frame>) {
    let supervisor = gateway.supervisor();
    let _ = out_tx.send(Frame::Event {
        event: Event::StateChanged(supervisor.state()),
    });
    let _ = out_tx.send(Frame::Event {
        event: Event::TlsConfigChanged(supervisor.tls_config()),
    });
}

async fn write_frames<W>(
    mut writer: W,
    mut frames: mpsc::UnboundedReceiver<Frame>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let mut line = serde_json::to_vec(&frame)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}
