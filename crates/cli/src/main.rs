//! `node-launcher` binary.

mod cli;
#[cfg(unix)]
mod client;
#[cfg(unix)]
mod launcher;

use clap::Parser;
use cli::Cli;
#[cfg(unix)]
use cli::Command;
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(unix)]
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing();

    let code = match cli.command {
        Command::Run {
            config,
            socket,
            ignore_system_time,
        } => launcher::run(&config, socket, ignore_system_time).await?,
        Command::Serve { config, socket } => launcher::serve(&config, &socket).await?,
        Command::Monitor {
            socket,
            ignore_system_time,
        } => launcher::monitor(&socket, ignore_system_time).await?,
        Command::Status { socket, json } => {
            client::status(&socket, json).await?;
            0
        }
        Command::Restart { socket, forced } => {
            client::restart(&socket, forced).await?;
            0
        }
        Command::InjectFault {
            socket,
            fault,
            disable,
        } => {
            client::inject_fault(&socket, fault, disable).await?;
            0
        }
        Command::AwaitUpdate { socket } => client::await_update(&socket).await?,
        Command::CheckConfig { config } => {
            launcher::check_config(&config)?;
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

#[cfg(not(unix))]
fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = Cli::parse();
    init_tracing();
    color_eyre::eyre::bail!("node-launcher requires a Unix platform")
}
