//! OS process controller backed by `tokio::process`.
//!
//! Each spawned node gets a supervision task that copies stdout and stderr
//! byte for byte into the log sink, picks structured [`NodeMessage`]s out of
//! stdout, and reports the exit once both streams are drained.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::process::controller::{
    ExitInfo, LogSink, ProcessController, ProcessError, ProcessEvent, SpawnedNode,
};
use crate::process::message::NodeMessage;

type SharedSink = Arc<tokio::sync::Mutex<LogSink>>;

struct ChildEntry {
    kill_tx: Option<oneshot::Sender<()>>,
}

/// Controller for real OS processes.
#[derive(Default, Clone)]
pub struct OsProcessController {
    children: Arc<Mutex<HashMap<u32, ChildEntry>>>,
}

impl OsProcessController {
    pub fn new() -> Self {
        Self::default()
    }

    fn children(&self) -> MutexGuard<'_, HashMap<u32, ChildEntry>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProcessController for OsProcessController {
    async fn spawn(
        &self,
        program: &Path,
        args: &[String],
        log: LogSink,
    ) -> Result<SpawnedNode, ProcessError> {
        let spawn_error = |source| ProcessError::Io {
            action: "spawn",
            path: program.to_path_buf(),
            source,
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let Some(pid) = child.id() else {
            return Err(spawn_error(io::Error::new(
                io::ErrorKind::Other,
                "process exited before its pid could be read",
            )));
        };

        let (kill_tx, kill_rx) = oneshot::channel();
        self.children().insert(
            pid,
            ChildEntry {
                kill_tx: Some(kill_tx),
            },
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let sink: SharedSink = Arc::new(tokio::sync::Mutex::new(log));

        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(forward_output(stdout, sink.clone(), Some(events_tx.clone())))
        });
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_output(stderr, sink.clone(), None)));

        let children = self.children.clone();
        tokio::spawn(async move {
            let status = wait_or_kill(&mut child, kill_rx, pid).await;

            for task in [stdout_task, stderr_task].into_iter().flatten() {
                let _ = task.await;
            }
            if let Err(e) = sink.lock().await.flush().await {
                warn!(pid, error = %e, "failed to flush node log");
            }

            children
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&pid);

            let info = match status {
                Ok(status) => exit_info(status),
                Err(e) => {
                    warn!(pid, error = %e, "failed to wait for node process");
                    ExitInfo::default()
                }
            };
            debug!(pid, %info, "node process exited");
            let _ = events_tx.send(ProcessEvent::Exited(info));
        });

        debug!(pid, program = %program.display(), "spawned node process");
        Ok(SpawnedNode {
            pid,
            events: events_rx,
        })
    }

    fn send_termination_signal(&self, pid: u32) -> Result<(), ProcessError> {
        if cfg!(unix) {
            terminate_pid(pid)
        } else {
            // Without signals, a graceful stop degrades to a kill.
            self.force_kill(pid)
        }
    }

    fn force_kill(&self, pid: u32) -> Result<(), ProcessError> {
        let kill_tx = self
            .children()
            .get_mut(&pid)
            .map(|entry| entry.kill_tx.take());

        match kill_tx {
            Some(Some(tx)) => {
                let _ = tx.send(());
                Ok(())
            }
            // Kill already requested, the process is on its way out.
            Some(None) => Ok(()),
            None => kill_pid(pid),
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.children().contains_key(&pid) || probe_pid(pid)
    }

    async fn process_name(&self, pid: u32) -> Option<String> {
        read_process_name(pid).await
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, ProcessError> {
        tokio::fs::read(path)
            .await
            .map_err(|source| ProcessError::Io {
                action: "read",
                path: path.to_path_buf(),
                source,
            })
    }

    async fn open_log_sink(&self, path: &Path) -> Result<LogSink, ProcessError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ProcessError::Io {
                    action: "create",
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| ProcessError::Io {
                action: "open",
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Box::new(file))
    }
}

async fn wait_or_kill(
    child: &mut Child,
    mut kill_rx: oneshot::Receiver<()>,
    pid: u32,
) -> io::Result<ExitStatus> {
    tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill_rx => {
            debug!(pid, "killing node process");
            if let Err(e) = child.start_kill() {
                warn!(pid, error = %e, "failed to kill node process");
            }
            child.wait().await
        }
    }
}

/// Copy raw output to the log; only valid stdout lines are parsed.
async fn forward_output<R>(
    reader: R,
    sink: SharedSink,
    events: Option<mpsc::UnboundedSender<ProcessEvent>>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if let Err(e) = sink.lock().await.write_all(&line).await {
                    warn!(error = %e, "failed to write node output to log");
                }

                if let Some(events) = &events {
                    let text = String::from_utf8_lossy(&line);
                    if let Some(message) = NodeMessage::parse_line(&text) {
                        let _ = events.send(ProcessEvent::Message(message));
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read node output");
                break;
            }
        }
    }
}

/// Kernel command name, truncated to 15 bytes.
#[cfg(target_os = "linux")]
async fn read_process_name(pid: u32) -> Option<String> {
    let comm = tokio::fs::read_to_string(format!("/proc/{pid}/comm"))
        .await
        .ok()?;
    Some(comm.trim_end().to_string())
}

#[cfg(not(target_os = "linux"))]
async fn read_process_name(_pid: u32) -> Option<String> {
    None
}

#[cfg(unix)]
fn exit_info(status: ExitStatus) -> ExitInfo {
    use std::os::unix::process::ExitStatusExt;
    ExitInfo {
        code: status.code(),
        signal: status.signal(),
    }
}

#[cfg(not(unix))]
fn exit_info(status: ExitStatus) -> ExitInfo {
    ExitInfo {
        code: status.code(),
        signal: None,
    }
}

#[cfg(unix)]
fn signal_pid(pid: u32, signal: Option<nix::sys::signal::Signal>) -> Result<(), ProcessError> {
    use nix::errno::Errno;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| ProcessError::NotFound(pid))?;
    match nix::sys::signal::kill(Pid::from_raw(raw), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(ProcessError::NotFound(pid)),
        Err(errno) => Err(ProcessError::Signal {
            pid,
            source: io::Error::from(errno),
        }),
    }
}

#[cfg(unix)]
fn terminate_pid(pid: u32) -> Result<(), ProcessError> {
    signal_pid(pid, Some(nix::sys::signal::Signal::SIGTERM))
}

#[cfg(unix)]
fn kill_pid(pid: u32) -> Result<(), ProcessError> {
    signal_pid(pid, Some(nix::sys::signal::Signal::SIGKILL))
}

/// Signal 0 probe. A permission error still means the process exists.
#[cfg(unix)]
fn probe_pid(pid: u32) -> bool {
    !matches!(signal_pid(pid, None), Err(ProcessError::NotFound(_)))
}

#[cfg(not(unix))]
fn terminate_pid(pid: u32) -> Result<(), ProcessError> {
    kill_pid(pid)
}

#[cfg(not(unix))]
fn kill_pid(pid: u32) -> Result<(), ProcessError> {
    Err(ProcessError::NotFound(pid))
}

#[cfg(not(unix))]
fn probe_pid(_pid: u32) -> bool {
    false
}
