//! # Hangar AWS
//!
//! Backends for running hangar against an AWS account.
//!
//! | Trait | Implementation | Service |
//! |---|---|---|
//! | `JobStore` | [`DynamoJobStore`] | DynamoDB |
//! | `AvailabilityStore` | [`DynamoAvailability`] | DynamoDB (conditional writes) |
//! | `WorkQueue` | [`SqsQueue`] | SQS |
//! | `MachineProvider` | [`Ec2Machines`] | EC2, SSM Run Command, S3 |
//! | `SecretStore` | [`AwsSecrets`] | Secrets Manager |
//!
//! Credentials and region come from the usual AWS environment, see
//! [`aws_config::load_defaults`].

mod dynamodb;
mod ec2;
mod secrets;
mod sqs;

pub use dynamodb::{DynamoAvailability, DynamoJobStore};
pub use ec2::Ec2Machines;
pub use secrets::AwsSecrets;
pub use sqs::SqsQueue;

pub use aws_config;
