//! Top-level commands and their handlers.

mod job;
mod machine;
mod worker;

pub use job::JobCommands;
pub use machine::MachineCommands;

use crate::config::Settings;

use anyhow::{Context, Result};
use clap::Subcommand;
use hangar_server::HangarServer;
use serde::Serialize;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Job submission and lookup, and single scheduler passes
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Machine provisioning and power management
    Machine {
        #[command(subcommand)]
        command: MachineCommands,
    },
    /// Run dispatch and collect passes periodically
    Worker {
        /// Seconds between passes
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "PORT", default_value_t = 3000)]
        port: u16,
    },
}

pub async fn handle_command(command: Commands, settings: &Settings) -> Result<()> {
    match command {
        Commands::Job { command } => job::handle_job_command(command, settings).await,
        Commands::Machine { command } => machine::handle_machine_command(command, settings).await,
        Commands::Worker { interval } => {
            let scheduler = settings.scheduler().await?;
            worker::run(&scheduler, std::time::Duration::from_secs(interval)).await
        }
        Commands::Serve { port } => serve(settings, port).await,
    }
}

async fn serve(settings: &Settings, port: u16) -> Result<()> {
    let app = HangarServer.build(settings.scheduler().await?);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
