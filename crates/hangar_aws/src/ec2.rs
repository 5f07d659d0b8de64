use hangar_core::prelude::*;

use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::types::{
    BlockDeviceMapping, EbsBlockDevice, Filter, Instance, InstanceType, ResourceType, Tag,
    TagSpecification,
};
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_ssm::Client as SsmClient;
use aws_sdk_ssm::types::CommandInvocationStatus;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::time::Duration;
use tracing::{debug, info};

const RUN_SHELL_SCRIPT: &str = "AWS-RunShellScript";

/// EC2 instances addressed by their `Name` tag, driven through SSM Run Command.
///
/// Command output is written to S3 by SSM and handed out as presigned links.
#[derive(Clone, Debug)]
pub struct Ec2Machines {
    ec2: Ec2Client,
    ssm: SsmClient,
    s3: S3Client,
}

impl Ec2Machines {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            ec2: Ec2Client::new(config),
            ssm: SsmClient::new(config),
            s3: S3Client::new(config),
        }
    }
}

fn to_machine(instance: &Instance) -> Result<Machine, MachineError> {
    let id = instance
        .instance_id()
        .ok_or_else(|| MachineError::System("Instance without id".into()))?;

    let state = instance
        .state()
        .and_then(|s| s.name())
        .ok_or_else(|| MachineError::System(format!("Instance {id} without state")))?
        .as_str()
        .parse::<PowerState>()?;

    let name = instance
        .tags()
        .iter()
        .find(|tag| tag.key() == Some("Name"))
        .and_then(|tag| tag.value())
        .unwrap_or_default();

    Ok(Machine {
        id: id.to_string(),
        name: name.to_string(),
        state,
        public_dns_name: instance
            .public_dns_name()
            .filter(|dns| !dns.is_empty())
            .map(str::to_string),
    })
}

fn first_machine<'a>(
    mut instances: impl Iterator<Item = &'a Instance>,
    missing: &str,
) -> Result<Machine, MachineError> {
    instances
        .next()
        .ok_or_else(|| MachineError::NotFound(missing.to_string()))
        .and_then(to_machine)
}

fn ec2_error<E: ProvideErrorMetadata + std::fmt::Display>(id: &str, op: &str, e: E) -> MachineError {
    match e.code() {
        Some("InvalidInstanceID.NotFound" | "InvalidInstanceID.Malformed") => {
            MachineError::NotFound(id.to_string())
        }
        _ => MachineError::System(format!("EC2 {op} failed for {id}: {e}")),
    }
}

/// Maps SSM's `https://s3.<region>.amazonaws.com/<bucket>/<key>` output links to `s3://<bucket>/<key>`.
fn s3_uri(url: &str) -> Option<String> {
    if url.starts_with("s3://") {
        return Some(url.to_string());
    }
    let rest = url.strip_prefix("https://")?;
    let (host, path) = rest.split_once('/')?;

    // Virtual-hosted style: <bucket>.s3.<region>.amazonaws.com/<key>
    if let Some((bucket, _)) = host.split_once(".s3.") {
        return Some(format!("s3://{bucket}/{path}"));
    }
    let (bucket, key) = path.split_once('/')?;
    Some(format!("s3://{bucket}/{key}"))
}

fn split_s3_uri(uri: &str) -> Result<(&str, &str), MachineError> {
    uri.strip_prefix("s3://")
        .and_then(|rest| rest.split_once('/'))
        .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
        .ok_or_else(|| MachineError::InvalidRequest(format!("Not an S3 object URI: '{uri}'")))
}

fn to_status(status: &CommandInvocationStatus) -> Result<CommandStatus, MachineError> {
    Ok(match status {
        CommandInvocationStatus::Pending => CommandStatus::Pending,
        CommandInvocationStatus::InProgress => CommandStatus::InProgress,
        CommandInvocationStatus::Delayed => CommandStatus::Delayed,
        CommandInvocationStatus::Success => CommandStatus::Success,
        CommandInvocationStatus::Failed => CommandStatus::Failed,
        CommandInvocationStatus::TimedOut => CommandStatus::TimedOut,
        CommandInvocationStatus::Cancelled | CommandInvocationStatus::Cancelling => {
            CommandStatus::Cancelled
        }
        other => {
            return Err(MachineError::System(format!(
                "Unknown command status {}",
                other.as_str()
            )));
        }
    })
}

impl MachineProvider for Ec2Machines {
    async fn find_by_name(&self, name: &str, states: &[PowerState]) -> Result<Machine, MachineError> {
        let output = self
            .ec2
            .describe_instances()
            .filters(Filter::builder().name("tag:Name").values(name).build())
            .filters(
                Filter::builder()
                    .name("instance-state-name")
                    .set_values(Some(states.iter().map(|s| s.as_str().to_string()).collect()))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| MachineError::System(format!("EC2 describe_instances failed: {e}")))?;

        first_machine(
            output.reservations().iter().flat_map(|r| r.instances()),
            name,
        )
    }

    async fn find_by_id(&self, id: &str) -> Result<Machine, MachineError> {
        let output = self
            .ec2
            .describe_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| ec2_error(id, "describe_instances", e))?;

        first_machine(output.reservations().iter().flat_map(|r| r.instances()), id)
    }

    async fn create(&self, spec: &LaunchSpec) -> Result<Machine, MachineError> {
        let tags = std::iter::once(("Name", spec.name.as_str()))
            .chain(spec.tags.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect::<Vec<_>>();

        let output = self
            .ec2
            .run_instances()
            .image_id(&spec.image_id)
            .instance_type(InstanceType::from(spec.instance_type.as_str()))
            .min_count(1)
            .max_count(1)
            .block_device_mappings(
                BlockDeviceMapping::builder()
                    .device_name(&spec.device_name)
                    .ebs(
                        EbsBlockDevice::builder()
                            .volume_size(spec.volume_size_gb)
                            .build(),
                    )
                    .build(),
            )
            .set_key_name(spec.key_name.clone())
            .tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Instance)
                    .set_tags(Some(tags))
                    .build(),
            )
            .user_data(STANDARD.encode(&spec.user_data))
            .send()
            .await
            .map_err(|e| MachineError::System(format!("EC2 run_instances failed: {e}")))?;

        let machine = first_machine(output.instances().iter(), &spec.name)?;
        info!("Launched instance {} as {}", machine.id, machine.name);
        Ok(machine)
    }

    async fn start(&self, id: &str) -> Result<(), MachineError> {
        self.ec2
            .start_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| ec2_error(id, "start_instances", e))?;
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<(), MachineError> {
        self.ec2
            .stop_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| ec2_error(id, "stop_instances", e))?;
        Ok(())
    }

    async fn terminate(&self, id: &str) -> Result<(), MachineError> {
        self.ec2
            .terminate_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| ec2_error(id, "terminate_instances", e))?;
        Ok(())
    }

    async fn run_command(
        &self,
        machine_id: &str,
        command: &str,
        output: Option<&OutputDestination>,
    ) -> Result<String, MachineError> {
        let mut request = self
            .ssm
            .send_command()
            .instance_ids(machine_id)
            .document_name(RUN_SHELL_SCRIPT)
            .parameters("commands", vec![command.to_string()]);

        if let Some(dest) = output {
            request = request.output_s3_bucket_name(&dest.bucket);
            if !dest.prefix.is_empty() {
                request = request.output_s3_key_prefix(&dest.prefix);
            }
        }

        let response = request.send().await.map_err(|e| match e.code() {
            Some("InvalidInstanceId") => MachineError::NotFound(machine_id.to_string()),
            _ => MachineError::System(format!("SSM send_command failed for {machine_id}: {e}")),
        })?;

        let command_id = response
            .command()
            .and_then(|c| c.command_id())
            .ok_or_else(|| MachineError::System("SSM returned no command id".into()))?;

        debug!("SSM command {command_id} sent to {machine_id}");
        Ok(command_id.to_string())
    }

    async fn command_report(
        &self,
        machine_id: &str,
        command_id: &str,
    ) -> Result<CommandReport, MachineError> {
        let output = self
            .ssm
            .get_command_invocation()
            .command_id(command_id)
            .instance_id(machine_id)
            .send()
            .await
            .map_err(|e| match e.code() {
                // Invocations show up with a short delay after send_command.
                Some("InvocationDoesNotExist") => {
                    MachineError::NotFound(format!("{command_id} on {machine_id}"))
                }
                _ => MachineError::System(format!(
                    "SSM get_command_invocation failed for {command_id}: {e}"
                )),
            })?;

        let status = output
            .status()
            .ok_or_else(|| MachineError::System(format!("Command {command_id} has no status")))
            .and_then(to_status)?;

        Ok(CommandReport {
            status,
            output_url: output
                .standard_output_url()
                .filter(|url| !url.is_empty())
                .and_then(s3_uri),
            stdout: output.standard_output_content().map(str::to_string),
        })
    }

    async fn presign(&self, output_url: &str, ttl: Duration) -> Result<String, MachineError> {
        let (bucket, key) = split_s3_uri(output_url)?;
        let config = PresigningConfig::expires_in(ttl)
            .map_err(|e| MachineError::InvalidRequest(format!("Invalid link lifetime: {e}")))?;

        let request = self
            .s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| MachineError::System(format!("S3 presigning failed: {e}")))?;

        Ok(request.uri().to_string())
    }
}
