use crate::error::*;
use crate::job::*;
use crate::machine::*;
use crate::notify::Notification;

use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// A trait for injecting the durable job record store.
pub trait JobStore: Send + Sync + 'static + Clone {
    /// Writes (creates or replaces) a job record.
    fn put(&self, job: &Job) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads a job record. Fails with [`StoreError::NotFound`] if it does not exist.
    fn get(&self, id: Uuid) -> impl Future<Output = Result<Job, StoreError>> + Send;
}

/// Provider-specific address of a queue (e.g., an SQS queue URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueHandle(pub String);

/// Single-use token identifying one delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(pub String);

/// One delivery of a queue message.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub body: String,
    pub receipt: ReceiptHandle,
}

impl Delivery {
    /// Decodes the `{"id": ...}` envelope.
    pub fn message(&self) -> Result<JobMessage, QueueError> {
        serde_json::from_str(&self.body)
            .map_err(|e| QueueError::MalformedMessage(format!("{}: {e}", self.body)))
    }
}

/// A trait for injecting an at-least-once work queue.
pub trait WorkQueue: Send + Sync + 'static + Clone {
    /// Looks up a queue by name.
    fn resolve(&self, name: &str) -> impl Future<Output = Result<QueueHandle, QueueError>> + Send;

    /// Enqueues a message.
    fn send(
        &self,
        queue: &QueueHandle,
        message: &JobMessage,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;

    /// Receives up to `max` messages, waiting at most `wait` for the first one.
    fn receive(
        &self,
        queue: &QueueHandle,
        max: usize,
        wait: Duration,
    ) -> impl Future<Output = Result<Vec<Delivery>, QueueError>> + Send;

    /// Acknowledges one delivery.
    fn delete(
        &self,
        queue: &QueueHandle,
        receipt: &ReceiptHandle,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;
}

/// A trait for injecting machine provisioning and remote command execution.
pub trait MachineProvider: Send + Sync + 'static + Clone {
    /// Finds a machine by its `Name` tag among machines in one of `states`.
    fn find_by_name(
        &self,
        name: &str,
        states: &[PowerState],
    ) -> impl Future<Output = Result<Machine, MachineError>> + Send;

    /// Finds a machine by its provider id.
    fn find_by_id(&self, id: &str) -> impl Future<Output = Result<Machine, MachineError>> + Send;

    /// Provisions a new machine.
    fn create(
        &self,
        spec: &LaunchSpec,
    ) -> impl Future<Output = Result<Machine, MachineError>> + Send;

    fn start(&self, id: &str) -> impl Future<Output = Result<(), MachineError>> + Send;

    fn stop(&self, id: &str) -> impl Future<Output = Result<(), MachineError>> + Send;

    fn terminate(&self, id: &str) -> impl Future<Output = Result<(), MachineError>> + Send;

    /// Submits a shell command for execution and returns its command id without waiting.
    ///
    /// If `output` is set, the command's output is written below that destination.
    fn run_command(
        &self,
        machine_id: &str,
        command: &str,
        output: Option<&OutputDestination>,
    ) -> impl Future<Output = Result<String, MachineError>> + Send;

    /// Observes a previously submitted command once.
    fn command_report(
        &self,
        machine_id: &str,
        command_id: &str,
    ) -> impl Future<Output = Result<CommandReport, MachineError>> + Send;

    /// Produces a time-limited download URL for an output location.
    fn presign(
        &self,
        output_url: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<String, MachineError>> + Send;
}

/// A trait for injecting the per-machine availability flag.
pub trait AvailabilityStore: Send + Sync + 'static + Clone {
    fn set(&self, name: &str, available: bool) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fails with [`StoreError::NotFound`] if the flag was never initialized.
    fn get(&self, name: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Atomically flips the flag from `true` to `false`.
    ///
    /// Returns `false` if the machine was not available.
    fn try_claim(&self, name: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Deletes the flag.
    fn remove(&self, name: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// A trait for injecting chat notifications.
pub trait Notifier: Send + Sync + 'static + Clone {
    fn post(
        &self,
        notification: &Notification,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// A [`Notifier`] that drops everything.
#[derive(Clone, Debug, Default)]
pub struct NoNotifier;

impl Notifier for NoNotifier {
    async fn post(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// A trait for injecting secret retrieval.
pub trait SecretStore: Send + Sync + 'static + Clone {
    /// Loads a secret holding a flat JSON object of strings.
    fn load(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<HashMap<String, String>, SecretError>> + Send;
}

/// The bundle of collaborators the scheduler is constructed with.
pub trait HangarServices: Send + Sync + 'static + Clone {
    type Jobs: JobStore;
    type Queue: WorkQueue;
    type Machines: MachineProvider;
    type Availability: AvailabilityStore;
    type Notifier: Notifier;

    fn jobs(&self) -> &Self::Jobs;
    fn queue(&self) -> &Self::Queue;
    fn machines(&self) -> &Self::Machines;
    fn availability(&self) -> &Self::Availability;
    fn notifier(&self) -> &Self::Notifier;
}

#[derive(Clone, Debug)]
pub struct CoreServices<J, Q, M, A, N = NoNotifier> {
    pub jobs: J,
    pub queue: Q,
    pub machines: M,
    pub availability: A,
    pub notifier: N,
}

impl<J, Q, M, A, N> HangarServices for CoreServices<J, Q, M, A, N>
where
    J: JobStore,
    Q: WorkQueue,
    M: MachineProvider,
    A: AvailabilityStore,
    N: Notifier,
{
    type Jobs = J;
    type Queue = Q;
    type Machines = M;
    type Availability = A;
    type Notifier = N;

    fn jobs(&self) -> &J {
        &self.jobs
    }
    fn queue(&self) -> &Q {
        &self.queue
    }
    fn machines(&self) -> &M {
        &self.machines
    }
    fn availability(&self) -> &A {
        &self.availability
    }
    fn notifier(&self) -> &N {
        &self.notifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_message() {
        let id = Uuid::new_v4();
        let delivery = Delivery {
            body: format!("{{\"id\": \"{id}\"}}"),
            receipt: ReceiptHandle("r-1".into()),
        };
        assert_eq!(delivery.message().unwrap().id, id);

        let broken = Delivery {
            body: "not json".into(),
            receipt: ReceiptHandle("r-2".into()),
        };
        assert!(matches!(broken.message(), Err(QueueError::MalformedMessage(_))));
    }

    #[tokio::test]
    async fn test_no_notifier() {
        assert!(NoNotifier.post(&Notification::new("hi")).await.is_ok());
    }
}
