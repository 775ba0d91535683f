use clap::{Parser, Subcommand};
use std::net::SocketAddr;

/// Sideload - Over-the-air iOS re-signing service
#[derive(Parser, Debug)]
#[command(name = "sideloadd")]
#[command(version = sideload_core::VERSION)]
#[command(about = "Sideload re-signing server daemon", long_about = None)]
pub struct Cli {
    /// Address to listen on (overrides SIDELOAD_BIND)
    #[arg(long, global = true)]
    pub bind: Option<SocketAddr>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Default)]
pub enum Commands {
    /// Run server in foreground (default if no command given)
    #[default]
    Run,

    /// Run one retention sweep over the working directories and exit
    Sweep,
}
