//! Process controller trait and supporting types.

use async_trait::async_trait;
use nl_protocol::ipc::UPDATE_EXIT_CODE;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use crate::process::message::NodeMessage;

/// Destination of the node's stdout and stderr.
pub type LogSink = Box<dyn AsyncWrite + Send + Unpin>;

/// How a process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitInfo {
    /// Exit code, absent when the process was terminated by a signal.
    pub code: Option<i32>,
    /// Terminating signal number, if any.
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn with_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// The process exited with the code reserved for applied updates.
    pub fn is_update_exit(&self) -> bool {
        self.code == Some(UPDATE_EXIT_CODE)
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Events produced by a spawned node, in the order they happened.
///
/// `Exited` is always the last event of a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Message(NodeMessage),
    Exited(ExitInfo),
}

/// Handle of a freshly spawned node.
#[derive(Debug)]
pub struct SpawnedNode {
    pub pid: u32,
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to signal process {pid}: {source}")]
    Signal { pid: u32, source: std::io::Error },

    #[error("Process {0} not found")]
    NotFound(u32),
}

/// OS-level operations the supervisor needs.
///
/// Implementations must be usable from several tasks at once.
#[async_trait]
pub trait ProcessController: Send + Sync {
    /// Spawn `program` with `args`, forwarding its output to `log`.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Io` if the program cannot be started.
    async fn spawn(
        &self,
        program: &Path,
        args: &[String],
        log: LogSink,
    ) -> Result<SpawnedNode, ProcessError>;

    /// Ask the process to terminate gracefully.
    fn send_termination_signal(&self, pid: u32) -> Result<(), ProcessError>;

    /// Terminate the process immediately.
    fn force_kill(&self, pid: u32) -> Result<(), ProcessError>;

    fn is_alive(&self, pid: u32) -> bool;

    /// Executable name of a live process as the OS reports it.
    ///
    /// `None` when the process is gone or the platform cannot tell.
    async fn process_name(&self, pid: u32) -> Option<String>;

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, ProcessError>;

    /// Open `path` for appending, creating it and its parent directory.
    async fn open_log_sink(&self, path: &Path) -> Result<LogSink, ProcessError>;
}
