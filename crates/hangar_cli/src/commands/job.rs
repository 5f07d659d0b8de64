use super::print_json;
use crate::config::Settings;

use anyhow::{Result, bail};
use clap::Subcommand;
use uuid::Uuid;

#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// Queue a shell command for a named machine
    Submit {
        /// Name tag of the machine to run on
        #[arg(long, short)]
        machine: String,

        /// S3 prefix receiving the command output, e.g. s3://bucket/logs
        #[arg(long, short)]
        output: String,

        /// Shell command to run
        command: String,
    },
    /// Show a job record
    Get { id: Uuid },
    /// Run one dispatch pass
    Dispatch,
    /// Run one collect pass
    Collect,
}

pub async fn handle_job_command(command: JobCommands, settings: &Settings) -> Result<()> {
    let scheduler = settings.scheduler().await?;

    match command {
        JobCommands::Submit {
            machine,
            output,
            command,
        } => print_json(&scheduler.submit(command, output, machine).await?),
        JobCommands::Get { id } => match scheduler.get(id).await? {
            Some(job) => print_json(&job),
            None => bail!("Job {id} not found"),
        },
        JobCommands::Dispatch => print_json(&scheduler.dispatch().await?),
        JobCommands::Collect => print_json(&scheduler.collect().await?),
    }
}
