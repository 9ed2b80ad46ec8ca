//! Node supervisor.
//!
//! The [`NodeSupervisor`] owns the lifecycle of exactly one node process.
//! All lifecycle operations (`start`, `stop`, `restart`, `expect_node_update`,
//! `exit`) are serialized through an operation lock. `stop`, `restart` and
//! `exit` raise an abort flag before queueing on the lock so that a startup
//! still waiting for readiness gives up early.
//!
//! Every state change is:
//! - validated against [`transitions::is_allowed`]
//! - published on the state watch channel and through the [`Broadcaster`]
//! - followed by the matching lifecycle hook
//!
//! The TLS config is only ever present while the node is `Running`.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nl_protocol::config_models::LauncherConfig;
use nl_protocol::node_models::{FaultInjection, NodeState, TlsConfig};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{NodeError, NodeResult};
use crate::process::{ExitInfo, NodeMessage, ProcessController, ProcessError, ProcessEvent};
use crate::state::hooks::{HookDetail, LifecycleHooks};
use crate::state::launch::{load_tls_config, node_args};
use crate::state::transitions;
use crate::storage::PidStore;

const ORPHAN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const COMM_NAME_LEN: usize = 15;

/// Receiver of state and TLS config broadcasts.
///
/// The IPC gateway implements this to forward changes to consumers.
pub trait Broadcaster: Send + Sync {
    fn broadcast_state(&self, state: NodeState);
    fn broadcast_tls_config(&self, config: Option<TlsConfig>);
}

/// Broadcaster that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn broadcast_state(&self, _state: NodeState) {}
    fn broadcast_tls_config(&self, _config: Option<TlsConfig>) {}
}

type ExitWatch = watch::Receiver<Option<ExitInfo>>;

#[derive(Clone)]
struct NodeProcess {
    pid: u32,
    exit: ExitWatch,
}

impl NodeProcess {
    fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }
}

#[derive(Default)]
struct Shared {
    state: NodeState,
    tls: Option<TlsConfig>,
    process: Option<NodeProcess>,
    faults: BTreeSet<FaultInjection>,
    crash_count: u32,
    /// Bumped by every explicit operation; invalidates scheduled crash restarts.
    generation: u64,
    last_start: Option<Instant>,
}

struct Inner {
    config: LauncherConfig,
    controller: Arc<dyn ProcessController>,
    store: Arc<dyn PidStore>,
    broadcaster: Arc<dyn Broadcaster>,
    hooks: LifecycleHooks,
    shared: Mutex<Shared>,
    op_lock: tokio::sync::Mutex<()>,
    state_tx: watch::Sender<NodeState>,
    abort_tx: watch::Sender<bool>,
}

/// Why a single startup attempt did not reach `Running`.
enum AttemptFailure {
    Exited(ExitInfo),
    TimedOut,
    Cancelled,
    Fatal(NodeError),
}

/// Supervisor of the managed node. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct NodeSupervisor {
    inner: Arc<Inner>,
}

impl NodeSupervisor {
    /// Create a supervisor in the `Stopped` state.
    ///
    /// # Arguments
    ///
    /// * `config` - Node configuration, used by every start
    /// * `controller` - Process primitives
    /// * `store` - Storage of the previous node pid
    /// * `broadcaster` - Receiver of state and TLS config changes
    /// * `hooks` - Lifecycle callbacks
    pub fn new(
        config: LauncherConfig,
        controller: Arc<dyn ProcessController>,
        store: Arc<dyn PidStore>,
        broadcaster: Arc<dyn Broadcaster>,
        hooks: LifecycleHooks,
    ) -> Self {
        let (state_tx, _) = watch::channel(NodeState::Stopped);
        let (abort_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                config,
                controller,
                store,
                broadcaster,
                hooks,
                shared: Mutex::new(Shared::default()),
                op_lock: tokio::sync::Mutex::new(()),
                state_tx,
                abort_tx,
            }),
        }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.inner.config
    }

    pub fn state(&self) -> NodeState {
        self.shared().state
    }

    /// TLS config of the running node, `None` in any other state.
    pub fn tls_config(&self) -> Option<TlsConfig> {
        self.shared().tls.clone()
    }

    /// Pid of the current node process, if one is alive.
    pub fn pid(&self) -> Option<u32> {
        self.shared()
            .process
            .as_ref()
            .filter(|process| !process.has_exited())
            .map(|process| process.pid)
    }

    /// Watch channel following every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<NodeState> {
        self.inner.state_tx.subscribe()
    }

    /// Crashes counted since the last successful explicit start or stop.
    pub fn crash_count(&self) -> u32 {
        self.shared().crash_count
    }

    /// Enable or disable a fault for the next spawn.
    ///
    /// Returns whether the set of active faults changed.
    pub fn set_fault(&self, fault: FaultInjection, enabled: bool) -> bool {
        let changed = {
            let mut shared = self.shared();
            if enabled {
                shared.faults.insert(fault)
            } else {
                shared.faults.remove(&fault)
            }
        };
        if changed {
            info!(%fault, enabled, "fault injection changed, applies on next start");
        }
        changed
    }

    pub fn active_faults(&self) -> Vec<FaultInjection> {
        self.shared().faults.iter().copied().collect()
    }

    /// Start the node.
    ///
    /// Kills a node left over from a previous session, then spawns up to
    /// `startup_max_retries` times until the node reports its API port.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` if the node is not `Stopped`, `Crashed` or `Errored`
    /// - `Fatal` if the node is unrecoverable or every attempt failed
    /// - `Cancelled` if a stop or exit interrupted the startup
    /// - IO or `Protocol` errors, after which the node is `Errored`
    pub async fn start(&self) -> NodeResult<()> {
        let _op = self.inner.op_lock.lock().await;
        self.inner.abort_tx.send_replace(false);
        self.bump_generation();
        self.start_locked().await
    }

    /// Stop the node: termination signal first, kill after `shutdown_timeout`.
    ///
    /// Stopping a node that is not running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the process survived the kill, after moving the
    /// node to `Errored`.
    pub async fn stop(&self) -> NodeResult<()> {
        self.inner.abort_tx.send_replace(true);
        let _op = self.inner.op_lock.lock().await;
        self.inner.abort_tx.send_replace(false);
        self.bump_generation();
        self.stop_locked().await
    }

    /// Stop then start the node.
    ///
    /// A non-forced restart waits until `restart_cooldown` has passed since
    /// the previous start.
    pub async fn restart(&self, forced: bool) -> NodeResult<()> {
        self.inner.abort_tx.send_replace(true);
        let _op = self.inner.op_lock.lock().await;
        self.inner.abort_tx.send_replace(false);
        self.bump_generation();

        let state = self.state();
        if state == NodeState::Unrecoverable {
            return Err(NodeError::Fatal(
                "node is unrecoverable and cannot be restarted".to_string(),
            ));
        }
        if transitions::is_terminal(state) || state == NodeState::Updating {
            return Err(NodeError::InvalidTransition {
                from: state,
                to: NodeState::Starting,
            });
        }

        info!(forced, %state, "restarting node");
        self.stop_locked().await?;
        if !forced {
            self.wait_restart_cooldown().await;
        }
        self.start_locked().await
    }

    /// Wait for the running node to apply an update and exit by itself.
    ///
    /// Any exit code counts as an applied update; codes other than the
    /// update exit code are logged. When the node does not exit within
    /// `update_timeout` it is killed and the node moves to `Errored`.
    pub async fn expect_node_update(&self) -> NodeResult<()> {
        let _op = self.inner.op_lock.lock().await;
        self.bump_generation();

        let process = self.shared().process.clone();
        self.change_state(NodeState::Updating, HookDetail::None)?;
        info!("waiting for node to apply update");

        let Some(process) = process else {
            self.change_state(NodeState::Updated, HookDetail::None)?;
            return Ok(());
        };

        let timeout = self.inner.config.update_timeout();
        let mut exit = process.exit.clone();
        match wait_for_exit(&mut exit, timeout).await {
            Some(info) => {
                if !info.is_update_exit() {
                    warn!(%info, "node exited with an unexpected code after update");
                }
                self.release_process().await;
                self.change_state(NodeState::Updated, HookDetail::None)?;
                info!(%info, "node applied update");
                Ok(())
            }
            None => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "node did not exit after update, killing it"
                );
                match self.force_kill_and_wait(&process).await {
                    Ok(()) => self.release_process().await,
                    Err(e) => error!(error = %e, "failed to kill node after update timeout"),
                }
                let err = NodeError::Timeout {
                    operation: "node to apply update",
                    after: timeout,
                };
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Move to `Exiting` and shut the node down for good.
    ///
    /// Calling `exit` again is a no-op.
    pub async fn exit(&self) -> NodeResult<()> {
        self.inner.abort_tx.send_replace(true);
        let _op = self.inner.op_lock.lock().await;
        self.bump_generation();

        if self.state() == NodeState::Exiting {
            return Ok(());
        }
        let process = self.live_process();
        self.change_state(NodeState::Exiting, HookDetail::None)?;

        if let Some(process) = process {
            info!(pid = process.pid, "stopping node before exit");
            self.terminate(&process).await?;
        }
        self.release_process().await;
        Ok(())
    }

    async fn start_locked(&self) -> NodeResult<()> {
        let state = self.state();
        match state {
            NodeState::Stopped | NodeState::Crashed | NodeState::Errored => {}
            NodeState::Unrecoverable => {
                return Err(NodeError::Fatal(
                    "node is unrecoverable and cannot be started".to_string(),
                ))
            }
            from => {
                return Err(NodeError::InvalidTransition {
                    from,
                    to: NodeState::Starting,
                })
            }
        }

        if let Err(err) = self.reconcile_previous_process().await {
            error!(error = %err, "failed to clean up previous node process");
            self.fail(&err);
            return Err(err);
        }

        let max_attempts = self.inner.config.startup_max_retries.max(1);
        self.shared().last_start = Some(Instant::now());

        for attempt in 1..=max_attempts {
            self.change_state(NodeState::Starting, HookDetail::None)?;
            info!(attempt, max_attempts, "starting node");

            match self.start_attempt().await {
                Ok(()) => return Ok(()),
                Err(AttemptFailure::Exited(exit)) => {
                    warn!(attempt, %exit, "node exited before becoming ready");
                }
                Err(AttemptFailure::TimedOut) => {
                    warn!(
                        attempt,
                        timeout_ms = self.inner.config.startup_timeout_ms,
                        "node did not become ready in time"
                    );
                }
                Err(AttemptFailure::Cancelled) => {
                    info!(attempt, "node startup cancelled");
                    return Err(NodeError::Cancelled);
                }
                Err(AttemptFailure::Fatal(err)) => {
                    error!(attempt, error = %err, "node startup failed");
                    self.fail(&err);
                    return Err(err);
                }
            }
        }

        self.change_state(NodeState::Unrecoverable, HookDetail::None)?;
        error!(max_attempts, "node could not be started, giving up");
        Err(NodeError::Fatal(format!(
            "node did not start after {max_attempts} attempts"
        )))
    }

    async fn start_attempt(&self) -> Result<(), AttemptFailure> {
        let config = &self.inner.config;
        let controller = &self.inner.controller;

        let log = controller
            .open_log_sink(&config.log_file_path())
            .await
            .map_err(|e| AttemptFailure::Fatal(e.into()))?;
        let faults = self.shared().faults.clone();
        let args = node_args(config, &faults);
        debug!(node = %config.node_path.display(), ?args, "spawning node");

        let spawned = controller
            .spawn(&config.node_path, &args, log)
            .await
            .map_err(|e| AttemptFailure::Fatal(e.into()))?;
        let pid = spawned.pid;
        self.remember_pid(Some(pid)).await;

        let (exit_tx, mut exit_rx) = watch::channel(None);
        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
        let process = NodeProcess {
            pid,
            exit: exit_rx.clone(),
        };
        self.shared().process = Some(process.clone());
        tokio::spawn(self.clone().pump_events(pid, spawned.events, exit_tx, ready_tx));

        let mut abort_rx = self.inner.abort_tx.subscribe();
        let aborted = *abort_rx.borrow_and_update();
        if aborted {
            self.kill_during_startup(&process).await;
            return Err(AttemptFailure::Cancelled);
        }

        let deadline = tokio::time::sleep(config.startup_timeout());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                Some(message) = ready_rx.recv() => match message {
                    NodeMessage::ReplyPort(port) => {
                        debug!(pid, port, "node reported its API port");
                        return self.finish_startup(&process, port).await;
                    }
                },
                Ok(()) = exit_rx.changed() => {
                    let exit = *exit_rx.borrow();
                    if let Some(exit) = exit {
                        self.release_process().await;
                        return Err(AttemptFailure::Exited(exit));
                    }
                }
                Ok(()) = abort_rx.changed() => {
                    let aborted = *abort_rx.borrow();
                    if aborted {
                        self.kill_during_startup(&process).await;
                        return Err(AttemptFailure::Cancelled);
                    }
                }
                _ = &mut deadline => {
                    self.kill_during_startup(&process).await;
                    return Err(AttemptFailure::TimedOut);
                }
            }
        }
    }

    async fn finish_startup(&self, process: &NodeProcess, port: u16) -> Result<(), AttemptFailure> {
        let tls = match load_tls_config(
            self.inner.controller.as_ref(),
            &self.inner.config.tls_path,
            port,
        )
        .await
        {
            Ok(tls) => tls,
            Err(err) => {
                self.kill_during_startup(process).await;
                return Err(AttemptFailure::Fatal(err));
            }
        };

        // The node may have died while the TLS files were read.
        if process.has_exited() {
            let exit = (*process.exit.borrow()).unwrap_or_default();
            self.release_process().await;
            return Err(AttemptFailure::Exited(exit));
        }

        self.change_state_with_tls(NodeState::Running, Some(tls), HookDetail::None)
            .map_err(AttemptFailure::Fatal)?;
        info!(pid = process.pid, port, "node is running");
        Ok(())
    }

    async fn kill_during_startup(&self, process: &NodeProcess) {
        match self.force_kill_and_wait(process).await {
            Ok(()) => self.release_process().await,
            Err(e) => warn!(pid = process.pid, error = %e, "failed to kill starting node"),
        }
    }

    /// Forward process events until the process exits.
    async fn pump_events(
        self,
        pid: u32,
        mut events: mpsc::UnboundedReceiver<ProcessEvent>,
        exit_tx: watch::Sender<Option<ExitInfo>>,
        ready_tx: mpsc::UnboundedSender<NodeMessage>,
    ) {
        let mut ready_tx = Some(ready_tx);
        let mut exit = ExitInfo::default();

        while let Some(event) = events.recv().await {
            match event {
                ProcessEvent::Message(message) => {
                    debug!(pid, ?message, "node message");
                    if let Some(tx) = &ready_tx {
                        if tx.send(message).is_err() {
                            ready_tx = None;
                        }
                    }
                }
                ProcessEvent::Exited(info) => {
                    exit = info;
                    break;
                }
            }
        }

        exit_tx.send_replace(Some(exit));
        self.handle_exit(pid, exit).await;
    }

    async fn handle_exit(&self, pid: u32, exit: ExitInfo) {
        let is_crash = {
            let shared = self.shared();
            let is_current = shared
                .process
                .as_ref()
                .is_some_and(|process| process.pid == pid);
            is_current && shared.state == NodeState::Running
        };

        if !is_crash {
            debug!(pid, %exit, "node exit handled by the running operation");
            return;
        }

        // Loses the race against a concurrent stop, which then owns the exit.
        if self
            .change_state(NodeState::Crashed, HookDetail::Exit(exit))
            .is_err()
        {
            return;
        }
        self.release_process().await;

        let (crash_count, generation) = {
            let mut shared = self.shared();
            shared.crash_count += 1;
            (shared.crash_count, shared.generation)
        };
        warn!(pid, %exit, crash_count, "node crashed");

        let max_restarts = self.inner.config.max_crash_restarts;
        if crash_count > max_restarts {
            error!(crash_count, max_restarts, "node keeps crashing, giving up");
            let _ = self.change_state(NodeState::Unrecoverable, HookDetail::None);
            return;
        }

        let delay = if crash_count == 1 {
            Duration::ZERO
        } else {
            self.inner.config.crash_restart_delay()
        };
        info!(delay_ms = delay.as_millis() as u64, "scheduling node restart after crash");
        tokio::spawn(self.clone().restart_after_crash(delay, generation));
    }

    /// Boxed to break the type cycle start -> pump -> crash -> start.
    fn restart_after_crash(
        self,
        delay: Duration,
        generation: u64,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            let _op = self.inner.op_lock.lock().await;

            let (state, current) = {
                let shared = self.shared();
                (shared.state, shared.generation)
            };
            if current != generation || state != NodeState::Crashed {
                debug!(%state, "skipping stale crash restart");
                return;
            }

            if let Err(e) = self.start_locked().await {
                warn!(error = %e, "restart after crash failed");
            }
        })
    }

    async fn stop_locked(&self) -> NodeResult<()> {
        let state = self.state();
        let process = self.live_process();

        match state {
            NodeState::Running | NodeState::Starting => {}
            NodeState::Crashed => return self.settle_crashed().await,
            _ if process.is_none() => {
                debug!(%state, "node is not running, nothing to stop");
                return Ok(());
            }
            from => {
                return Err(NodeError::InvalidTransition {
                    from,
                    to: NodeState::Stopping,
                })
            }
        }

        if let Err(err) = self.change_state(NodeState::Stopping, HookDetail::None) {
            // The node crashed after its state was read.
            if self.state() == NodeState::Crashed {
                return self.settle_crashed().await;
            }
            return Err(err);
        }

        if let Some(process) = process {
            info!(pid = process.pid, "stopping node");
            if let Err(err) = self.terminate(&process).await {
                error!(pid = process.pid, error = %err, "node could not be stopped");
                self.fail(&err);
                return Err(err);
            }
        }

        self.release_process().await;
        self.shared().crash_count = 0;
        self.change_state(NodeState::Stopped, HookDetail::None)?;
        info!("node stopped");
        Ok(())
    }

    /// Stop a crashed node: its process is gone, only the pending restart
    /// has to be dropped.
    async fn settle_crashed(&self) -> NodeResult<()> {
        self.bump_generation();
        self.release_process().await;
        self.shared().crash_count = 0;
        self.change_state(NodeState::Stopped, HookDetail::None)?;
        info!("crashed node stopped, restart cancelled");
        Ok(())
    }

    /// Graceful stop with escalation to a kill.
    async fn terminate(&self, process: &NodeProcess) -> NodeResult<()> {
        let timeout = self.inner.config.shutdown_timeout();
        match self.inner.controller.send_termination_signal(process.pid) {
            Ok(()) => {}
            Err(ProcessError::NotFound(_)) => {
                debug!(pid = process.pid, "node already gone");
            }
            Err(e) => warn!(pid = process.pid, error = %e, "failed to signal node"),
        }

        let mut exit = process.exit.clone();
        if let Some(info) = wait_for_exit(&mut exit, timeout).await {
            debug!(pid = process.pid, %info, "node exited gracefully");
            return Ok(());
        }

        warn!(
            pid = process.pid,
            timeout_ms = timeout.as_millis() as u64,
            "node ignored termination request, killing it"
        );
        self.force_kill_and_wait(process).await
    }

    async fn force_kill_and_wait(&self, process: &NodeProcess) -> NodeResult<()> {
        match self.inner.controller.force_kill(process.pid) {
            Ok(()) | Err(ProcessError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let timeout = self.inner.config.kill_timeout();
        let mut exit = process.exit.clone();
        match wait_for_exit(&mut exit, timeout).await {
            Some(_) => Ok(()),
            None => Err(NodeError::Timeout {
                operation: "node to die after kill",
                after: timeout,
            }),
        }
    }

    /// Kill a node recorded by a previous session that is still alive.
    ///
    /// The pid may have been reused since, so a live process is only killed
    /// when its name matches the node executable.
    async fn reconcile_previous_process(&self) -> NodeResult<()> {
        let key = self.inner.config.pid_storage_key();
        let previous = match self.inner.store.load(&key).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(error = %e, "could not read previous node pid");
                return Ok(());
            }
        };
        let Some(pid) = previous else {
            return Ok(());
        };

        let controller = &self.inner.controller;
        if !controller.is_alive(pid) {
            debug!(pid, "previous node process is gone");
        } else {
            match controller.process_name(pid).await {
                Some(name) if is_node_process(&name, &self.inner.config.node_path) => {
                    warn!(pid, %name, "node from a previous session is still running, killing it");
                    self.kill_orphan(pid).await?;
                    info!(pid, "previous node process killed");
                }
                name => {
                    info!(pid, ?name, "previous node pid now belongs to another process");
                }
            }
        }

        self.remember_pid(None).await;
        Ok(())
    }

    async fn kill_orphan(&self, pid: u32) -> NodeResult<()> {
        let controller = &self.inner.controller;
        match controller.force_kill(pid) {
            Ok(()) | Err(ProcessError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let timeout = self.inner.config.kill_timeout();
        let deadline = Instant::now() + timeout;
        while controller.is_alive(pid) {
            if Instant::now() >= deadline {
                return Err(NodeError::Timeout {
                    operation: "previous node to die",
                    after: timeout,
                });
            }
            tokio::time::sleep(ORPHAN_POLL_INTERVAL).await;
        }
        Ok(())
    }

    async fn wait_restart_cooldown(&self) {
        let Some(last_start) = self.shared().last_start else {
            return;
        };
        let remaining = self
            .inner
            .config
            .restart_cooldown()
            .saturating_sub(last_start.elapsed());
        if !remaining.is_zero() {
            info!(
                remaining_ms = remaining.as_millis() as u64,
                "waiting for restart cooldown"
            );
            tokio::time::sleep(remaining).await;
        }
    }

    fn live_process(&self) -> Option<NodeProcess> {
        self.shared()
            .process
            .clone()
            .filter(|process| !process.has_exited())
    }

    async fn release_process(&self) {
        let released = self.shared().process.take();
        if released.is_some() {
            self.remember_pid(None).await;
        }
    }

    async fn remember_pid(&self, pid: Option<u32>) {
        let key = self.inner.config.pid_storage_key();
        if let Err(e) = self.inner.store.store(&key, pid).await {
            warn!(error = %e, ?pid, "failed to persist node pid");
        }
    }

    fn bump_generation(&self) {
        self.shared().generation += 1;
    }

    /// Move to `Errored` unless the current state forbids it.
    fn fail(&self, err: &NodeError) {
        let _ = self.change_state(NodeState::Errored, HookDetail::Error(err.to_string()));
    }

    fn change_state(&self, to: NodeState, detail: HookDetail) -> NodeResult<()> {
        self.change_state_with_tls(to, None, detail)
    }

    fn change_state_with_tls(
        &self,
        to: NodeState,
        tls: Option<TlsConfig>,
        detail: HookDetail,
    ) -> NodeResult<()> {
        let (from, tls_changed) = {
            let mut shared = self.shared();
            let from = shared.state;
            if !transitions::is_allowed(from, to) {
                return Err(NodeError::InvalidTransition { from, to });
            }
            let tls = if to == NodeState::Running { tls } else { None };
            let tls_changed = shared.tls != tls;
            shared.state = to;
            shared.tls = tls.clone();
            (from, tls_changed.then_some(tls))
        };

        info!(%from, %to, "node state changed");
        self.inner.state_tx.send_replace(to);
        self.inner.broadcaster.broadcast_state(to);
        if let Some(tls) = tls_changed {
            self.inner.broadcaster.broadcast_tls_config(tls);
        }
        self.inner.hooks.fire(to, &detail);
        Ok(())
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Whether an OS process name belongs to the node executable at `node_path`.
///
/// Linux truncates command names, so a name of full length only has to be a
/// prefix of the executable name.
fn is_node_process(name: &str, node_path: &Path) -> bool {
    let Some(expected) = node_path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let expected = expected.strip_suffix(".exe").unwrap_or(expected);
    let name = name.strip_suffix(".exe").unwrap_or(name);
    name == expected || (name.len() == COMM_NAME_LEN && expected.starts_with(name))
}

/// Wait up to `timeout` for the process to exit.
async fn wait_for_exit(exit: &mut ExitWatch, timeout: Duration) -> Option<ExitInfo> {
    match tokio::time::timeout(timeout, exit.wait_for(Option::is_some)).await {
        Ok(Ok(info)) => *info,
        _ => None,
    }
}
