//! Hangar CLI
//!
//! Submits jobs, runs scheduler passes and manages machines against the AWS
//! backends. `serve` and `worker` are long-running.

mod backend;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hangar")]
#[command(about = "Runs queued shell jobs on provisioned machines", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hangar=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    handle_command(cli.command, &cli.settings).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{JobCommands, MachineCommands};
    use crate::config::AvailabilityBackend;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_submit_arguments() {
        let cli = Cli::try_parse_from([
            "hangar",
            "--availability-backend",
            "memory",
            "job",
            "submit",
            "--machine",
            "builder",
            "--output",
            "s3://artifacts/ci",
            "make test",
        ])
        .unwrap();

        assert_eq!(cli.settings.availability_backend, AvailabilityBackend::Memory);
        match cli.command {
            Commands::Job {
                command:
                    JobCommands::Submit {
                        machine,
                        output,
                        command,
                    },
            } => {
                assert_eq!(machine, "builder");
                assert_eq!(output, "s3://artifacts/ci");
                assert_eq!(command, "make test");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_machine_create_arguments() {
        let cli = Cli::try_parse_from([
            "hangar", "machine", "create", "--size", "large", "--tag", "team=ci",
        ])
        .unwrap();

        match cli.command {
            Commands::Machine {
                command: MachineCommands::Create { size, tags, .. },
            } => {
                assert_eq!(size, Some(hangar_core::machine::InstanceSize::Large));
                assert_eq!(tags, vec![("team".to_string(), "ci".to_string())]);
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["hangar", "machine", "create", "--size", "tiny"]).is_err());
        assert!(Cli::try_parse_from(["hangar", "machine", "stop"]).is_err());
    }
}
