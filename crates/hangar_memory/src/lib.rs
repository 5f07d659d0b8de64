//! # Hangar Memory
//!
//! In-process implementations of every hangar backend trait.
//!
//! Nothing here survives a restart. The crate exists for tests, local
//! experiments and as the `memory` availability backend of a single-node
//! deployment.
//!
//! ## Usage
//!
//! ```no_run
//! use hangar_core::prelude::*;
//! use hangar_memory::*;
//!
//! let services = CoreServices {
//!     jobs: MemoryJobStore::default(),
//!     queue: MemoryQueue::with_queues([queues::WAITING, queues::RUNNING]),
//!     machines: SimulatedMachines::default(),
//!     availability: MemoryAvailability::default(),
//!     notifier: NoNotifier,
//! };
//! ```

mod machines;
mod queue;
mod store;

pub use machines::SimulatedMachines;
pub use queue::MemoryQueue;
pub use store::{MemoryAvailability, MemoryJobStore};

use std::sync::{Mutex, MutexGuard};

pub(crate) fn lock<'a, T, E>(
    mutex: &'a Mutex<T>,
    err: impl FnOnce(String) -> E,
) -> Result<MutexGuard<'a, T>, E> {
    mutex
        .lock()
        .map_err(|_| err("Internal Error: state mutex poisoned".to_string()))
}
