//! One-shot commands talking to a running launcher over its socket.

use std::path::Path;
use std::time::Duration;

use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use colored::Colorize;
use nl_monitor::link::{GatewayLink, StreamLink};
use nl_protocol::ipc::{Event, Request, Response};
use nl_protocol::{CardanoStatus, FaultInjection, NodeState};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::info;

/// Restarts and update waits can take as long as the node's timeouts.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

async fn connect(socket: &Path) -> Result<StreamLink> {
    StreamLink::connect(socket)
        .await
        .wrap_err_with(|| format!("Cannot reach launcher at {}", socket.display()))
}

async fn request(link: &StreamLink, request: Request) -> Result<Response> {
    let channel = request.channel();
    let response = tokio::time::timeout(REQUEST_TIMEOUT, link.request(request))
        .await
        .wrap_err_with(|| format!("No answer on {channel}"))??;

    match response {
        Response::Error { kind, message } => bail!("{channel} failed ({kind:?}): {message}"),
        response => Ok(response),
    }
}

pub async fn status(socket: &Path, as_json: bool) -> Result<()> {
    let link = connect(socket).await?;

    let Response::State(state) = request(&link, Request::GetState).await? else {
        bail!("Unexpected answer to getState");
    };
    let Response::TlsConfig(tls) = request(&link, Request::GetTlsConfig).await? else {
        bail!("Unexpected answer to getTlsConfig");
    };
    let Response::Status(status) = request(&link, Request::GetStatus).await? else {
        bail!("Unexpected answer to getStatus");
    };
    let Response::Faults(faults) = request(&link, Request::GetFaults).await? else {
        bail!("Unexpected answer to getFaults");
    };
    let port = tls.map(|tls| tls.port);

    if as_json {
        let report = json!({
            "state": state,
            "apiPort": port,
            "status": status,
            "faults": faults,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{:<14} {}", "Node:", paint_state(state));
    match port {
        Some(port) => println!("{:<14} {port}", "API port:"),
        None => println!("{:<14} {}", "API port:", "-".dimmed()),
    }
    print_status(&status);
    if !faults.is_empty() {
        let names: Vec<_> = faults.iter().map(FaultInjection::as_str).collect();
        println!("{:<14} {}", "Faults:", names.join(", ").yellow());
    }
    Ok(())
}

fn paint_state(state: NodeState) -> colored::ColoredString {
    let name = state.as_str();
    match state {
        NodeState::Running => name.green().bold(),
        NodeState::Starting | NodeState::Stopping | NodeState::Updating => name.yellow(),
        NodeState::Crashed | NodeState::Errored | NodeState::Unrecoverable => name.red().bold(),
        _ => name.normal(),
    }
}

fn print_status(status: &CardanoStatus) {
    let flag = |value: bool| if value { "yes".green() } else { "no".red() };

    println!("{:<14} {}", "Responding:", flag(status.is_node_responding));
    println!("{:<14} {}", "Subscribed:", flag(status.is_node_subscribed));
    println!("{:<14} {}", "Syncing:", flag(status.is_node_syncing));
    println!("{:<14} {}", "In sync:", flag(status.is_node_in_sync));
}

pub async fn restart(socket: &Path, forced: bool) -> Result<()> {
    let link = connect(socket).await?;
    request(&link, Request::Restart { forced }).await?;
    println!("{}", "Node restarted".green());
    Ok(())
}

pub async fn inject_fault(socket: &Path, fault: FaultInjection, disable: bool) -> Result<()> {
    let link = connect(socket).await?;
    request(
        &link,
        Request::SetFault {
            fault,
            enabled: !disable,
        },
    )
    .await?;

    let verb = if disable { "Disabled" } else { "Enabled" };
    println!("{verb} {fault}, effective on the next node start");
    Ok(())
}

/// Ask the launcher to await the node update and return the exit code it requests.
pub async fn await_update(socket: &Path) -> Result<i32> {
    let link = connect(socket).await?;
    let mut events = link.subscribe();
    request(&link, Request::AwaitUpdate).await?;
    info!("Waiting for the node to apply its update");

    loop {
        match events.recv().await {
            Ok(Event::ExitRequested { code }) => {
                println!("Node updated, exit code {code}");
                return Ok(code);
            }
            Ok(Event::StateChanged(state)) => info!(%state, "Node state changed"),
            Ok(Event::TlsConfigChanged(_)) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => bail!("Launcher closed the connection"),
        }
    }
}
