//! Lifecycle hooks.
//!
//! Hooks are invoked synchronously on every matching transition. A panic
//! inside a hook is caught and logged and never reaches the state machine.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use nl_protocol::node_models::NodeState;
use tracing::error;

use crate::process::ExitInfo;

type Hook = Arc<dyn Fn() + Send + Sync>;
type ExitHook = Arc<dyn Fn(ExitInfo) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Extra data passed to the hook of a transition.
#[derive(Debug, Clone, Default)]
pub(crate) enum HookDetail {
    #[default]
    None,
    Exit(ExitInfo),
    Error(String),
}

/// Optional callbacks fired when the node enters a state.
///
/// # Example
///
/// ```rust
/// use nl_core::state::LifecycleHooks;
///
/// let hooks = LifecycleHooks::new()
///     .on_running(|| println!("node is up"))
///     .on_crashed(|exit| eprintln!("node crashed with {exit}"));
/// ```
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    starting: Option<Hook>,
    running: Option<Hook>,
    stopping: Option<Hook>,
    stopped: Option<Hook>,
    updating: Option<Hook>,
    updated: Option<Hook>,
    crashed: Option<ExitHook>,
    errored: Option<ErrorHook>,
    unrecoverable: Option<Hook>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_starting(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.starting = Some(Arc::new(hook));
        self
    }

    pub fn on_running(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.running = Some(Arc::new(hook));
        self
    }

    pub fn on_stopping(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.stopping = Some(Arc::new(hook));
        self
    }

    pub fn on_stopped(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.stopped = Some(Arc::new(hook));
        self
    }

    pub fn on_updating(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.updating = Some(Arc::new(hook));
        self
    }

    pub fn on_updated(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.updated = Some(Arc::new(hook));
        self
    }

    pub fn on_crashed(mut self, hook: impl Fn(ExitInfo) + Send + Sync + 'static) -> Self {
        self.crashed = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.errored = Some(Arc::new(hook));
        self
    }

    pub fn on_unrecoverable(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.unrecoverable = Some(Arc::new(hook));
        self
    }

    /// Fire the hook registered for `state`, if any.
    pub(crate) fn fire(&self, state: NodeState, detail: &HookDetail) {
        let plain = match state {
            NodeState::Starting => &self.starting,
            NodeState::Running => &self.running,
            NodeState::Stopping => &self.stopping,
            NodeState::Stopped => &self.stopped,
            NodeState::Updating => &self.updating,
            NodeState::Updated => &self.updated,
            NodeState::Unrecoverable => &self.unrecoverable,
            NodeState::Crashed => {
                if let (Some(hook), HookDetail::Exit(exit)) = (&self.crashed, detail) {
                    guarded(state, || hook(*exit));
                }
                return;
            }
            NodeState::Errored => {
                if let Some(hook) = &self.errored {
                    let message = match detail {
                        HookDetail::Error(message) => message.as_str(),
                        _ => "unknown error",
                    };
                    guarded(state, || hook(message));
                }
                return;
            }
            NodeState::Exiting => return,
        };

        if let Some(hook) = plain {
            guarded(state, || hook());
        }
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<&str> = [
            ("starting", self.starting.is_some()),
            ("running", self.running.is_some()),
            ("stopping", self.stopping.is_some()),
            ("stopped", self.stopped.is_some()),
            ("updating", self.updating.is_some()),
            ("updated", self.updated.is_some()),
            ("crashed", self.crashed.is_some()),
            ("errored", self.errored.is_some()),
            ("unrecoverable", self.unrecoverable.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();

        f.debug_struct("LifecycleHooks")
            .field("registered", &registered)
            .finish()
    }
}

fn guarded(state: NodeState, hook: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(hook)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(%state, panic = %message, "lifecycle hook panicked");
    }
}
