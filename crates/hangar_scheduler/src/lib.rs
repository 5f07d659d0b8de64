//! # Hangar Scheduler
//!
//! The job lifecycle protocol, written against the traits of `hangar_core`.
//!
//! - **[`JobScheduler`](scheduler::JobScheduler)**: `submit`, `dispatch`, `collect` and `get`.
//! - **[`MachineController`](controller::MachineController)**: Attaches to machines and drives them through power states, readiness probes and commands.
//! - **[`MachineRegistry`](registry::MachineRegistry)**: The availability flag used to hand a machine to exactly one job.
//! - **[`PollPolicy`](poll::PollPolicy)**: The trial budget of every remote observation.
//!
//! ## Example
//!
//! ```rust,ignore
//! let services = CoreServices {
//!     jobs,
//!     queue,
//!     machines,
//!     availability,
//!     notifier: NoNotifier,
//! };
//! let scheduler = JobScheduler::new(services, SchedulerConfig::default());
//!
//! let job = scheduler.submit("make test", "s3://artifacts/ci", "builder").await?;
//! let report = scheduler.dispatch().await?;
//! let finished = scheduler.collect().await?;
//! ```

pub mod controller;
pub mod poll;
pub mod registry;
pub mod scheduler;

pub mod prelude {
    pub use super::controller::*;
    pub use super::poll::*;
    pub use super::registry::*;
    pub use super::scheduler::*;
}
