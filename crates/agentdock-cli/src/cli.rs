//! CLI argument definitions for agentdock.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// agentdock -- upgrade-surviving agent registry.
#[derive(Parser)]
#[command(
    name = "agentdock",
    version,
    about = "agentdock -- agent registry that survives host upgrades",
    long_about = "Simulates one host process lifetime per invocation: boot from the durable \
                  slot, run the command, checkpoint before exit."
)]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, short, global = true, default_value = "config/agentdock.toml")]
    pub config: PathBuf,

    /// Override the data directory holding the durable slots.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a new agent and print its id.
    Register {
        /// Display name for the agent.
        name: String,
    },

    /// Unregister an agent by id.
    Unregister {
        /// The agent id.
        id: String,
    },

    /// List registered agent ids.
    List {
        /// Print JSON instead of one id per line.
        #[arg(long)]
        json: bool,
    },

    /// Show one agent, by id or (case-insensitive) name.
    Show {
        /// Agent id or name.
        agent: String,
    },

    /// Show lifecycle and storage status.
    Status,

    /// Simulate a host upgrade: checkpoint, destroy, restart, restore.
    Upgrade,
}
