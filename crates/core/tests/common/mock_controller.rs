//! Scripted process controller for deterministic lifecycle tests.

use async_trait::async_trait;
use nl_core::process::{
    ExitInfo, LogSink, NodeMessage, ProcessController, ProcessError, ProcessEvent, SpawnedNode,
};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// What a spawned fake node does on its own.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnBehavior {
    /// Report readiness on `port` right away.
    Ready { port: u16 },
    /// Exit with `code` before reporting readiness.
    ExitBeforeReady { code: i32 },
    /// Never report anything.
    Hang,
}

#[derive(Default)]
struct MockState {
    script: VecDeque<SpawnBehavior>,
    running: HashMap<u32, mpsc::UnboundedSender<ProcessEvent>>,
    /// Processes from other sessions, by pid, with their executable name.
    orphans: HashMap<u32, String>,
    files: HashMap<PathBuf, Vec<u8>>,
    spawns: Vec<(u32, Vec<String>)>,
    terms: Vec<u32>,
    kills: Vec<u32>,
    ignore_term: bool,
    ignore_kill: bool,
    next_pid: u32,
}

/// Process controller whose nodes follow a script.
///
/// Spawns consume the script front to back and fall back to the default
/// behavior once it is empty. Files are served from memory and logs are
/// discarded, so tests never touch the filesystem.
pub struct MockProcessController {
    default: SpawnBehavior,
    state: Mutex<MockState>,
}

#[allow(dead_code)]
impl MockProcessController {
    pub fn new(default: SpawnBehavior) -> Self {
        Self {
            default,
            state: Mutex::new(MockState {
                next_pid: 1000,
                ..MockState::default()
            }),
        }
    }

    /// Controller whose nodes become ready on port 8090.
    pub fn ready() -> Self {
        Self::new(SpawnBehavior::Ready { port: 8090 })
    }

    pub fn with_script(self, behaviors: impl IntoIterator<Item = SpawnBehavior>) -> Self {
        self.state.lock().unwrap().script.extend(behaviors);
        self
    }

    pub fn with_file(self, path: impl Into<PathBuf>, content: &[u8]) -> Self {
        self.add_file(path, content);
        self
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, content: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.into(), content.to_vec());
    }

    /// Pretend a node from another session is alive.
    pub fn add_orphan(&self, pid: u32) {
        self.add_foreign_process(pid, "cardano-node");
    }

    /// Pretend an arbitrary process holds `pid`.
    pub fn add_foreign_process(&self, pid: u32, name: &str) {
        self.state
            .lock()
            .unwrap()
            .orphans
            .insert(pid, name.to_string());
    }

    pub fn set_ignore_term(&self, ignore: bool) {
        self.state.lock().unwrap().ignore_term = ignore;
    }

    pub fn set_ignore_kill(&self, ignore: bool) {
        self.state.lock().unwrap().ignore_kill = ignore;
    }

    /// Make a running fake node exit with `code`.
    pub fn exit(&self, pid: u32, code: i32) {
        let tx = self.state.lock().unwrap().running.remove(&pid);
        let tx = tx.unwrap_or_else(|| panic!("process {pid} is not running"));
        let _ = tx.send(ProcessEvent::Exited(ExitInfo::with_code(code)));
    }

    /// Make a running fake node print a structured message.
    pub fn emit(&self, pid: u32, message: NodeMessage) {
        let state = self.state.lock().unwrap();
        let tx = state
            .running
            .get(&pid)
            .unwrap_or_else(|| panic!("process {pid} is not running"));
        let _ = tx.send(ProcessEvent::Message(message));
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().spawns.len()
    }

    pub fn spawned_args(&self) -> Vec<Vec<String>> {
        let state = self.state.lock().unwrap();
        state.spawns.iter().map(|(_, args)| args.clone()).collect()
    }

    pub fn last_pid(&self) -> Option<u32> {
        self.state.lock().unwrap().spawns.last().map(|(pid, _)| *pid)
    }

    pub fn term_calls(&self) -> Vec<u32> {
        self.state.lock().unwrap().terms.clone()
    }

    pub fn kill_calls(&self) -> Vec<u32> {
        self.state.lock().unwrap().kills.clone()
    }

    pub fn running_pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.state.lock().unwrap().running.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    fn signal(&self, pid: u32, exit: ExitInfo, ignored: bool) -> Result<(), ProcessError> {
        let mut state = self.state.lock().unwrap();
        if state.running.contains_key(&pid) {
            if !ignored {
                if let Some(tx) = state.running.remove(&pid) {
                    let _ = tx.send(ProcessEvent::Exited(exit));
                }
            }
            Ok(())
        } else if state.orphans.contains_key(&pid) {
            if !ignored {
                state.orphans.remove(&pid);
            }
            Ok(())
        } else {
            Err(ProcessError::NotFound(pid))
        }
    }
}

#[async_trait]
impl ProcessController for MockProcessController {
    async fn spawn(
        &self,
        _program: &Path,
        args: &[String],
        _log: LogSink,
    ) -> Result<SpawnedNode, ProcessError> {
        let mut state = self.state.lock().unwrap();
        let pid = state.next_pid;
        state.next_pid += 1;
        state.spawns.push((pid, args.to_vec()));

        let behavior = state.script.pop_front().unwrap_or(self.default);
        let (tx, rx) = mpsc::unbounded_channel();
        match behavior {
            SpawnBehavior::Ready { port } => {
                let _ = tx.send(ProcessEvent::Message(NodeMessage::ReplyPort(port)));
                state.running.insert(pid, tx);
            }
            SpawnBehavior::ExitBeforeReady { code } => {
                let _ = tx.send(ProcessEvent::Exited(ExitInfo::with_code(code)));
            }
            SpawnBehavior::Hang => {
                state.running.insert(pid, tx);
            }
        }

        Ok(SpawnedNode { pid, events: rx })
    }

    fn send_termination_signal(&self, pid: u32) -> Result<(), ProcessError> {
        let ignored = {
            let mut state = self.state.lock().unwrap();
            state.terms.push(pid);
            state.ignore_term
        };
        self.signal(pid, ExitInfo::with_signal(15), ignored)
    }

    fn force_kill(&self, pid: u32) -> Result<(), ProcessError> {
        let ignored = {
            let mut state = self.state.lock().unwrap();
            state.kills.push(pid);
            state.ignore_kill
        };
        self.signal(pid, ExitInfo::with_signal(9), ignored)
    }

    fn is_alive(&self, pid: u32) -> bool {
        let state = self.state.lock().unwrap();
        state.running.contains_key(&pid) || state.orphans.contains_key(&pid)
    }

    async fn process_name(&self, pid: u32) -> Option<String> {
        let state = self.state.lock().unwrap();
        if state.running.contains_key(&pid) {
            return Some("cardano-node".to_string());
        }
        state.orphans.get(&pid).cloned()
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, ProcessError> {
        let state = self.state.lock().unwrap();
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| ProcessError::Io {
                action: "read",
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            })
    }

    async fn open_log_sink(&self, _path: &Path) -> Result<LogSink, ProcessError> {
        Ok(Box::new(tokio::io::sink()))
    }
}
