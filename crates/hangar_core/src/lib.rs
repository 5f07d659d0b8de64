//! # Hangar Core
//!
//! Types and traits for the ecosystem.
//!
//! Defines the job record, the machine model and the collaborator contracts the
//! scheduler is built against:
//!
//! - **[`Job`](job::Job)**: The durable record of a queued shell command and its outcome.
//! - **[`JobStore`](traits::JobStore)**: Trait for the key-value store holding job records.
//! - **[`WorkQueue`](traits::WorkQueue)**: Trait for the at-least-once queues carrying job ids.
//! - **[`MachineProvider`](traits::MachineProvider)**: Trait for provisioning machines and running commands on them.
//! - **[`AvailabilityStore`](traits::AvailabilityStore)**: Trait for the per-machine "free for work" flag.
//! - **[`Notifier`](traits::Notifier)**: Trait for posting human-readable messages to a webhook.

pub mod constants;
pub mod error;
pub mod job;
pub mod machine;
pub mod notify;
pub mod traits;

pub mod prelude {
    pub use super::constants::*;
    pub use super::error::*;
    pub use super::job::*;
    pub use super::machine::*;
    pub use super::notify::*;
    pub use super::traits::*;
}
