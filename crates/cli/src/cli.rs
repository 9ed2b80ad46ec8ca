//! Command line definition.

use clap::{Parser, Subcommand};
use nl_protocol::FaultInjection;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "node-launcher")]
#[command(version)]
#[command(about = "Supervise a blockchain node and monitor its network status")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the supervisor and the status monitor in one process
    Run {
        /// Launcher configuration file (.yaml, .yml or .toml)
        #[arg(short, long)]
        config: PathBuf,

        /// Also serve the gateway on this Unix socket
        #[arg(long)]
        socket: Option<PathBuf>,

        /// Treat the system time as correct regardless of NTP checks
        #[arg(long)]
        ignore_system_time: bool,
    },

    /// Run the supervisor and serve its gateway on a Unix socket
    Serve {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long)]
        socket: PathBuf,
    },

    /// Monitor a node supervised by another process
    Monitor {
        #[arg(short, long)]
        socket: PathBuf,

        #[arg(long)]
        ignore_system_time: bool,
    },

    /// Print the node state and cached connectivity status
    Status {
        #[arg(short, long)]
        socket: PathBuf,

        /// Print machine readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Restart the node
    Restart {
        #[arg(short, long)]
        socket: PathBuf,

        /// Skip the restart cooldown
        #[arg(long)]
        forced: bool,
    },

    /// Toggle a fault injection for the next node start
    InjectFault {
        #[arg(short, long)]
        socket: PathBuf,

        /// Fault name, e.g. ignore-shutdown or FInjIgnoreShutdown
        fault: FaultInjection,

        /// Remove the fault instead of adding it
        #[arg(long)]
        disable: bool,
    },

    /// Wait for the node to exit after applying an update
    AwaitUpdate {
        #[arg(short, long)]
        socket: PathBuf,
    },

    /// Validate a launcher configuration file
    CheckConfig {
        #[arg(index = 1)]
        config: PathBuf,
    },
}
