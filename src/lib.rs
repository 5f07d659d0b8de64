//! # Hangar
//!
//! Runs queued shell commands on long-lived build machines.
//!
//! A job names a machine, a command and an S3 prefix for its output. Jobs wait
//! on a queue until their machine is running, bootstrapped and free, then
//! execute remotely; a later pass records the outcome, hands out a download
//! link and powers the machine down again.
//!
//! This crate serves as an entry point, re-exporting the core types and
//! optionally including the scheduler, server and backends via feature flags.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **`scheduler`** | The job lifecycle protocol (`hangar_scheduler`). Enabled by default. |
//! | **`server`** | The Axum-based HTTP API (`hangar_server`). |
//! | **`memory`** | In-process backends for tests and single-node setups (`hangar_memory`). |
//! | **`aws`** | DynamoDB, SQS, EC2/SSM, S3 and Secrets Manager backends (`hangar_aws`). |
//! | **`slack`** | Incoming-webhook notifier (`hangar_slack`). |
//!
//! ## Example: Server on AWS
//!
//! ```toml
//! [dependencies]
//! hangar = { version = "0.3", features = ["server", "aws"] }
//! ```
//!
//! ```rust,ignore
//! use hangar::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
//!
//!     let services = CoreServices {
//!         jobs: DynamoJobStore::new(&aws, tables::JOBS),
//!         queue: SqsQueue::new(&aws),
//!         machines: Ec2Machines::new(&aws),
//!         availability: DynamoAvailability::new(&aws, tables::AVAILABILITY),
//!         notifier: NoNotifier,
//!     };
//!
//!     let app = HangarServer.build(JobScheduler::new(services, SchedulerConfig::default()));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub use hangar_core::*;

#[cfg(feature = "scheduler")]
pub mod scheduler {
    pub use hangar_scheduler::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use hangar_server::*;
}

#[cfg(feature = "memory")]
pub mod memory {
    pub use hangar_memory::*;
}

#[cfg(feature = "aws")]
pub mod aws {
    pub use hangar_aws::*;
}

#[cfg(feature = "slack")]
pub mod slack {
    pub use hangar_slack::*;
}

pub mod prelude {
    pub use hangar_core::prelude::*;

    #[cfg(feature = "scheduler")]
    pub use hangar_scheduler::prelude::*;

    #[cfg(feature = "server")]
    pub use hangar_server::prelude::*;

    #[cfg(feature = "memory")]
    pub use hangar_memory::{MemoryAvailability, MemoryJobStore, MemoryQueue, SimulatedMachines};

    #[cfg(feature = "aws")]
    pub use hangar_aws::{AwsSecrets, DynamoAvailability, DynamoJobStore, Ec2Machines, SqsQueue};

    #[cfg(feature = "slack")]
    pub use hangar_slack::WebhookNotifier;
}
