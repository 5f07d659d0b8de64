use super::print_json;
use crate::config::Settings;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Subcommand};
use hangar_core::prelude::*;
use hangar_scheduler::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

/// Selects a machine by name tag or by instance id.
#[derive(Args, Debug)]
pub struct Target {
    /// Name tag of the machine
    #[arg(required_unless_present = "id", conflicts_with = "id")]
    name: Option<String>,

    /// Instance id of the machine
    #[arg(long)]
    id: Option<String>,
}

impl Target {
    fn to_ref(&self) -> Result<MachineRef> {
        match (&self.name, &self.id) {
            (_, Some(id)) => Ok(MachineRef::Id(id.clone())),
            (Some(name), None) => Ok(MachineRef::Name(name.clone())),
            (None, None) => Err(anyhow!("Either a name or --id is required")),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum MachineCommands {
    /// Provision a machine and mark it available
    Create {
        /// Name tag; defaults to hangar-<uuid>
        #[arg(long)]
        name: Option<String>,

        /// Instance class preset: small, medium, large or huge
        #[arg(long)]
        size: Option<InstanceSize>,

        /// Explicit instance type, overrides --size
        #[arg(long)]
        instance_type: Option<String>,

        #[arg(long)]
        image: Option<String>,

        /// Root volume size in GB
        #[arg(long)]
        volume: Option<i32>,

        #[arg(long)]
        key_name: Option<String>,

        /// Extra tags as KEY=VALUE
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,

        /// Script to run on first boot
        #[arg(long)]
        user_data: Option<PathBuf>,

        /// Block until the bootstrap script has finished
        #[arg(long)]
        wait: bool,
    },
    Start(Target),
    Stop(Target),
    /// Terminate the machine and forget its availability flag
    Terminate(Target),
    /// Show power state, readiness and availability
    Status(Target),
    /// Mark the machine free for work
    Enable(Target),
    /// Take the machine out of rotation
    Disable(Target),
}

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

pub async fn handle_machine_command(command: MachineCommands, settings: &Settings) -> Result<()> {
    let services = settings.services().await?;
    let controller = MachineController::new(
        services.machines.clone(),
        services.availability.clone(),
        PollPolicy::default(),
    );
    let notifier = &services.notifier;

    match command {
        MachineCommands::Create {
            name,
            size,
            instance_type,
            image,
            volume,
            key_name,
            tags,
            user_data,
            wait,
        } => {
            let user_data = user_data
                .map(|path| {
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))
                })
                .transpose()?;

            let overrides = LaunchOverrides {
                size,
                image_id: image,
                instance_type,
                volume_size_gb: volume,
                key_name,
                name,
                tags: tags.into_iter().collect::<BTreeMap<_, _>>(),
                user_data,
            };

            let machine = controller.create(overrides).await?;
            announce(notifier, "Machine created", machine.machine()).await;

            if wait {
                machine.wait_until_initialized().await?;
            }
            print_json(machine.machine())
        }
        MachineCommands::Start(target) => {
            let mut machine = controller.attach(&target.to_ref()?).await?;
            machine.start().await?;
            print_json(machine.machine())
        }
        MachineCommands::Stop(target) => {
            let mut machine = controller.attach(&target.to_ref()?).await?;
            machine.stop().await?;
            print_json(machine.machine())
        }
        MachineCommands::Terminate(target) => {
            let mut machine = controller.attach(&target.to_ref()?).await?;
            machine.terminate().await?;
            announce(notifier, "Machine terminated", machine.machine()).await;
            print_json(machine.machine())
        }
        MachineCommands::Status(target) => {
            let machine = controller.attach(&target.to_ref()?).await?;
            let available = match machine.is_available().await {
                Ok(available) => Some(available),
                Err(StoreError::NotFound(_)) => None,
                Err(e) => return Err(e.into()),
            };
            let initialized = if machine.is_running() {
                Some(machine.is_initialized().await?)
            } else {
                None
            };

            print_json(&json!({
                "machine": machine.machine(),
                "initialized": initialized,
                "available": available,
            }))
        }
        MachineCommands::Enable(target) => {
            let machine = controller.attach(&target.to_ref()?).await?;
            machine.enable().await?;
            print_json(machine.machine())
        }
        MachineCommands::Disable(target) => {
            let machine = controller.attach(&target.to_ref()?).await?;
            machine.disable().await?;
            print_json(machine.machine())
        }
    }
}

async fn announce<N: Notifier>(notifier: &N, title: &str, machine: &Machine) {
    let dns = machine.public_dns_name.as_deref().unwrap_or("-");
    let text = banner(
        title,
        &[
            ("Name", machine.name.as_str()),
            ("Instance ID", machine.id.as_str()),
            ("Public DNS", dns),
        ],
    );

    if let Err(e) = notifier.post(&Notification::new(text)).await {
        warn!("Failed to announce {}: {e}", machine.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        assert_eq!(
            parse_tag("team=ci").unwrap(),
            ("team".to_string(), "ci".to_string())
        );
        assert_eq!(
            parse_tag("note=a=b").unwrap(),
            ("note".to_string(), "a=b".to_string())
        );
        assert!(parse_tag("=x").is_err());
        assert!(parse_tag("team").is_err());
    }
}
