use clap::{Parser, Subcommand};

/// Fleetpulse - Telemetry collection and settlement service
#[derive(Parser)]
#[command(name = "fleetpulse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the collector (default)
    Serve,

    /// List the provisioned demo fleet
    Devices,
}
