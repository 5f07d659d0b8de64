use crate::backend::{Announcer, Availability};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use hangar_aws::aws_config::{self, BehaviorVersion, SdkConfig};
use hangar_aws::{AwsSecrets, DynamoAvailability, DynamoJobStore, Ec2Machines, SqsQueue};
use hangar_core::prelude::*;
use hangar_memory::MemoryAvailability;
use hangar_scheduler::prelude::*;
use hangar_slack::WebhookNotifier;
use std::time::Duration;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AvailabilityBackend {
    Memory,
    Dynamo,
}

/// Settings shared by every command.
#[derive(Args, Clone, Debug)]
pub struct Settings {
    /// DynamoDB table holding job records
    #[arg(long, env = "HANGAR_JOB_TABLE", default_value = tables::JOBS, global = true)]
    pub job_table: String,

    /// DynamoDB table holding machine availability flags
    #[arg(long, env = "HANGAR_AVAILABILITY_TABLE", default_value = tables::AVAILABILITY, global = true)]
    pub availability_table: String,

    /// Where availability flags are kept
    #[arg(long, env = "HANGAR_AVAILABILITY_BACKEND", value_enum, default_value_t = AvailabilityBackend::Dynamo, global = true)]
    pub availability_backend: AvailabilityBackend,

    /// Queue of jobs waiting for a machine
    #[arg(long, env = "HANGAR_WAITING_QUEUE", default_value = queues::WAITING, global = true)]
    pub waiting_queue: String,

    /// Queue of jobs running on a machine
    #[arg(long, env = "HANGAR_RUNNING_QUEUE", default_value = queues::RUNNING, global = true)]
    pub running_queue: String,

    /// Secrets Manager entry with `webhook_url` (and optionally `username`) for announcements
    #[arg(long, env = "HANGAR_SECRET", global = true)]
    pub secret: Option<String>,

    /// Lifetime of output download links, in seconds
    #[arg(long, env = "HANGAR_DOWNLOAD_TTL", default_value_t = 3600, global = true)]
    pub download_ttl: u64,
}

pub type Services = CoreServices<DynamoJobStore, SqsQueue, Ec2Machines, Availability, Announcer>;

impl Settings {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            waiting_queue: self.waiting_queue.clone(),
            running_queue: self.running_queue.clone(),
            download_ttl: Duration::from_secs(self.download_ttl),
            ..Default::default()
        }
    }

    pub fn availability(&self, aws: &SdkConfig) -> Availability {
        match self.availability_backend {
            AvailabilityBackend::Memory => Availability::Memory(MemoryAvailability::default()),
            AvailabilityBackend::Dynamo => {
                Availability::Dynamo(DynamoAvailability::new(aws, &self.availability_table))
            }
        }
    }

    pub async fn announcer(&self, aws: &SdkConfig) -> Result<Announcer> {
        let Some(name) = &self.secret else {
            return Ok(Announcer(None));
        };

        let secret = AwsSecrets::new(aws)
            .load(name)
            .await
            .with_context(|| format!("Failed to load secret {name}"))?;
        let webhook = WebhookNotifier::from_secret(&secret)
            .with_context(|| format!("Secret {name} has no webhook settings"))?;

        info!("Announcements go to the webhook configured in {name}");
        Ok(Announcer(Some(webhook)))
    }

    /// Connects every backend. AWS credentials and region come from the environment.
    pub async fn services(&self) -> Result<Services> {
        let aws = aws_config::load_defaults(BehaviorVersion::latest()).await;

        Ok(CoreServices {
            jobs: DynamoJobStore::new(&aws, &self.job_table),
            queue: SqsQueue::new(&aws),
            machines: Ec2Machines::new(&aws),
            availability: self.availability(&aws),
            notifier: self.announcer(&aws).await?,
        })
    }

    pub async fn scheduler(&self) -> Result<JobScheduler<Services>> {
        Ok(JobScheduler::new(
            self.services().await?,
            self.scheduler_config(),
        ))
    }
}
