//! Long-running commands: the supervisor and the status monitor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use colored::Colorize;
use nl_core::config::load_launcher_config;
use nl_core::ipc::{serve_connection, EventBus, IpcGateway};
use nl_core::process::OsProcessController;
use nl_core::state::{LifecycleHooks, NodeSupervisor};
use nl_core::storage::JsonFilePidStore;
use nl_monitor::link::StreamLink;
use nl_monitor::source::HttpStatusSource;
use nl_monitor::{MonitorApp, MonitorConfig, StatusMonitor};
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Build the supervisor and its gateway from a configuration file.
fn build_gateway(config_path: &Path) -> Result<IpcGateway> {
    let config = load_launcher_config(config_path)
        .wrap_err_with(|| format!("Invalid launcher config {}", config_path.display()))?;
    info!(
        network = %config.network,
        node = %config.node_path.display(),
        "Loaded launcher config"
    );

    let bus = EventBus::new();
    let store = JsonFilePidStore::in_dir(&config.state_dir());
    let hooks = LifecycleHooks::new()
        .on_running(|| info!("Node is running"))
        .on_crashed(|exit| warn!(%exit, "Node crashed"))
        .on_error(|message| error!(%message, "Node errored"))
        .on_unrecoverable(|| error!("Node is unrecoverable, restart the launcher"));

    let supervisor = NodeSupervisor::new(
        config,
        Arc::new(OsProcessController::new()),
        Arc::new(store),
        Arc::new(bus.clone()),
        hooks,
    );
    Ok(IpcGateway::new(supervisor, bus))
}

/// Run the supervisor with an in-process status monitor.
///
/// Returns the process exit code.
pub async fn run(
    config: &Path,
    socket: Option<PathBuf>,
    ignore_system_time: bool,
) -> Result<i32> {
    let gateway = build_gateway(config)?;
    let server = socket
        .as_deref()
        .map(|path| serve_socket(gateway.clone(), path))
        .transpose()?;

    let app = MonitorApp::new(Arc::new(gateway.clone()), status_monitor(ignore_system_time));

    let mut signals = ShutdownSignals::register()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app_task = tokio::spawn(app.run(shutdown_rx));

    let code = supervise(&gateway, &mut signals).await;

    shutdown_tx.send_replace(true);
    match app_task.await {
        Ok(Err(e)) => warn!(error = %e, "Status monitor stopped with an error"),
        Err(e) => warn!(error = %e, "Status monitor task failed"),
        Ok(Ok(_)) => {}
    }
    shutdown(&gateway, server, socket.as_deref()).await?;
    Ok(code)
}

/// Run the supervisor and serve its gateway until interrupted.
pub async fn serve(config: &Path, socket: &Path) -> Result<i32> {
    let gateway = build_gateway(config)?;
    let mut signals = ShutdownSignals::register()?;
    let server = serve_socket(gateway.clone(), socket)?;

    let code = supervise(&gateway, &mut signals).await;

    shutdown(&gateway, Some(server), Some(socket)).await?;
    Ok(code)
}

/// Monitor a node supervised by another launcher process.
pub async fn monitor(socket: &Path, ignore_system_time: bool) -> Result<i32> {
    let link = StreamLink::connect(socket)
        .await
        .wrap_err_with(|| format!("Cannot reach launcher at {}", socket.display()))?;
    let app = MonitorApp::new(Arc::new(link), status_monitor(ignore_system_time));

    let mut signals = ShutdownSignals::register()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        signals.recv().await;
        shutdown_tx.send_replace(true);
    });

    let requested = app.run(shutdown_rx).await;
    interrupt.abort();
    Ok(requested?.unwrap_or(0))
}

/// Load and validate a configuration file, printing the result.
pub fn check_config(config_path: &Path) -> Result<()> {
    let config = load_launcher_config(config_path)
        .wrap_err_with(|| format!("Invalid launcher config {}", config_path.display()))?;

    println!("{} {}", "Valid:".green().bold(), config_path.display());
    println!("  network      {}", config.network);
    println!("  node         {}", config.node_path.display());
    println!("  tls          {}", config.tls_path.display());
    println!("  log file     {}", config.log_file_path().display());
    println!("  state dir    {}", config.state_dir().display());
    Ok(())
}

fn status_monitor(ignore_system_time: bool) -> Arc<StatusMonitor> {
    let config = MonitorConfig {
        ignore_system_time,
        ..MonitorConfig::default()
    };
    let source = Arc::new(HttpStatusSource::new(config.request_timeout));
    Arc::new(StatusMonitor::new(config, source))
}

/// SIGINT and SIGTERM listeners, registered before the node starts.
struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    fn register() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).wrap_err("Cannot listen for SIGINT")?,
            terminate: signal(SignalKind::terminate()).wrap_err("Cannot listen for SIGTERM")?,
        })
    }

    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("Interrupted, shutting down"),
            _ = self.terminate.recv() => info!("Terminated, shutting down"),
        }
    }
}

/// Start the node, then wait until the launcher should shut down.
///
/// A signal during startup aborts it: `exit` raises the abort flag, and the
/// startup kills the half-started node before `exit` takes over.
async fn supervise(gateway: &IpcGateway, signals: &mut ShutdownSignals) -> i32 {
    let supervisor = gateway.supervisor();
    let start = supervisor.start();
    tokio::pin!(start);

    let started = tokio::select! {
        started = &mut start => started,
        _ = signals.recv() => {
            let (started, exited) = tokio::join!(&mut start, supervisor.exit());
            if let Err(e) = started {
                info!(error = %e, "Node startup abandoned");
            }
            if let Err(e) = exited {
                warn!(error = %e, "Node did not stop cleanly");
            }
            return 0;
        }
    };

    match started {
        Ok(()) => wait_for_shutdown(gateway, signals).await,
        Err(e) => {
            error!(error = %e, "Node failed to start");
            1
        }
    }
}

/// Wait for a shutdown signal or an exit requested through the gateway.
async fn wait_for_shutdown(gateway: &IpcGateway, signals: &mut ShutdownSignals) -> i32 {
    let mut exit_rx = gateway.exit_requests();

    tokio::select! {
        _ = signals.recv() => 0,
        requested = exit_rx.wait_for(Option::is_some) => {
            let code = requested.ok().and_then(|code| *code).unwrap_or(0);
            info!(code, "Exit requested");
            code
        }
    }
}

async fn shutdown(
    gateway: &IpcGateway,
    server: Option<JoinHandle<()>>,
    socket: Option<&Path>,
) -> Result<()> {
    if let Some(server) = server {
        server.abort();
    }
    if let Some(socket) = socket {
        let _ = std::fs::remove_file(socket);
    }

    gateway
        .supervisor()
        .exit()
        .await
        .map_err(|e| eyre!("Failed to stop node: {e}"))
}

/// Accept consumer connections on a Unix socket.
fn serve_socket(gateway: IpcGateway, path: &Path) -> Result<JoinHandle<()>> {
    if path.exists() {
        // Left behind by a launcher that did not shut down cleanly
        std::fs::remove_file(path)
            .wrap_err_with(|| format!("Cannot remove stale socket {}", path.display()))?;
    }
    let listener = UnixListener::bind(path)
        .wrap_err_with(|| format!("Cannot listen on {}", path.display()))?;
    info!(socket = %path.display(), "Serving gateway");

    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let gateway = gateway.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(gateway, stream).await {
                            warn!(error = %e, "Consumer connection failed");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept consumer connection");
                    break;
                }
            }
        }
    }))
}
