//! Job Scheduler
//!
//! Moves jobs through QUEUED -> INPROGRESS -> SUCCESS | FAILED.
//!
//! `dispatch` and `collect` are short batch passes meant to be triggered
//! periodically. Every message is handled on its own: an error is logged and
//! leaves the message unacknowledged, so the next pass sees it again. A
//! message is only deleted after the transition it stands for was written.

use crate::controller::{BoundMachine, MachineController};
use crate::poll::PollPolicy;

use chrono::Utc;
use hangar_core::prelude::*;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Queue holding ids of QUEUED jobs.
    pub waiting_queue: String,
    /// Queue holding ids of INPROGRESS jobs.
    pub running_queue: String,
    /// Maximum number of messages handled per pass.
    pub batch_size: usize,
    /// How long a pass waits for the first message.
    pub receive_wait: Duration,
    /// Lifetime of output download links.
    pub download_ttl: Duration,
    /// Trial budget for readiness probes and command outcomes.
    pub poll: PollPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            waiting_queue: queues::WAITING.to_string(),
            running_queue: queues::RUNNING.to_string(),
            batch_size: 10,
            receive_wait: Duration::from_secs(10),
            download_ttl: Duration::from_secs(3600),
            poll: PollPolicy::default(),
        }
    }
}

/// What happened to one waiting-queue message.
enum Dispatched {
    Executed(Job),
    Rejected(DispatchFailure),
    /// Left in the queue for a later pass.
    Deferred(&'static str),
    /// The job already moved on; the message was acknowledged.
    Settled,
}

pub struct JobScheduler<S: HangarServices> {
    services: S,
    controller: MachineController<S::Machines, S::Availability>,
    config: SchedulerConfig,
}

impl<S: HangarServices> JobScheduler<S> {
    pub fn new(services: S, config: SchedulerConfig) -> Self {
        let controller = MachineController::new(
            services.machines().clone(),
            services.availability().clone(),
            config.poll,
        );
        Self {
            services,
            controller,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn controller(&self) -> &MachineController<S::Machines, S::Availability> {
        &self.controller
    }

    /// Records a new QUEUED job and announces it on the waiting queue.
    ///
    /// The record is written before the message is sent, so dispatch never
    /// sees an id it cannot load.
    pub async fn submit(
        &self,
        command: impl Into<String>,
        output_dir: impl Into<String>,
        machine_name: impl Into<String>,
    ) -> Result<Job, SchedulerError> {
        let config = JobConfig {
            command: command.into(),
            output_dir: output_dir.into(),
            machine_name: machine_name.into(),
        };

        if config.command.trim().is_empty() {
            return Err(SchedulerError::InvalidRequest("command is empty".into()));
        }
        if config.machine_name.trim().is_empty() {
            return Err(SchedulerError::InvalidRequest("machine name is empty".into()));
        }
        config
            .output_dir
            .parse::<OutputDestination>()
            .map_err(|e| SchedulerError::InvalidRequest(e.to_string()))?;

        let job = Job::new(config, Utc::now());
        self.services.jobs().put(&job).await?;

        let queue = self.services.queue();
        let waiting = queue.resolve(&self.config.waiting_queue).await?;
        queue.send(&waiting, &JobMessage { id: job.id }).await?;

        info!(
            "Job {} queued for machine {}",
            job.id, job.config.machine_name
        );
        Ok(job)
    }

    /// Looks a job up without side effects.
    pub async fn get(&self, id: Uuid) -> Result<Option<Job>, SchedulerError> {
        match self.services.jobs().get(id).await {
            Ok(job) => Ok(Some(job)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Claims machines for waiting jobs and launches their commands.
    ///
    /// Only failing to reach the queue is fatal. Jobs whose machine does not
    /// exist are reported in [`DispatchReport::errors`]; everything else that
    /// cannot proceed right now stays queued.
    pub async fn dispatch(&self) -> Result<DispatchReport, SchedulerError> {
        let queue = self.services.queue();
        let waiting = queue.resolve(&self.config.waiting_queue).await?;
        let running = queue.resolve(&self.config.running_queue).await?;

        let deliveries = queue
            .receive(&waiting, self.config.batch_size, self.config.receive_wait)
            .await?;

        let mut report = DispatchReport::default();
        if deliveries.is_empty() {
            debug!("No waiting jobs");
            return Ok(report);
        }

        for delivery in deliveries {
            match self.dispatch_one(&delivery, &waiting, &running).await {
                Ok(Dispatched::Executed(job)) => report.executed.push(job),
                Ok(Dispatched::Rejected(failure)) => {
                    warn!(
                        "Job {} cannot run: machine {} does not exist",
                        failure.id, failure.message
                    );
                    report.errors.push(failure);
                }
                Ok(Dispatched::Deferred(reason)) => debug!("Deferred message: {reason}"),
                Ok(Dispatched::Settled) => {}
                Err(e) => warn!("Dispatch of message failed ({:?}): {e}", e.kind()),
            }
        }

        info!(
            "Dispatch pass: {} executed, {} errors",
            report.executed.len(),
            report.errors.len()
        );
        Ok(report)
    }

    async fn dispatch_one(
        &self,
        delivery: &Delivery,
        waiting: &QueueHandle,
        running: &QueueHandle,
    ) -> Result<Dispatched, SchedulerError> {
        let queue = self.services.queue();
        let message = delivery.message()?;
        let mut job = self.services.jobs().get(message.id).await?;

        match job.state {
            JobState::Queued => {}
            JobState::InProgress => {
                // Launched by an earlier pass that stopped before acknowledging.
                queue.send(running, &message).await?;
                queue.delete(waiting, &delivery.receipt).await?;
                info!("Job {} was already running, handed over to collect", job.id);
                return Ok(Dispatched::Settled);
            }
            JobState::Success | JobState::Failed => {
                queue.delete(waiting, &delivery.receipt).await?;
                return Ok(Dispatched::Settled);
            }
        }

        let target = MachineRef::Name(job.config.machine_name.clone());
        let mut machine = match self.controller.attach(&target).await {
            Ok(machine) => machine,
            Err(MachineError::NotFound(_)) => {
                return Ok(Dispatched::Rejected(DispatchFailure {
                    id: job.id,
                    code: DispatchErrorCode::MachineDoesNotExist,
                    message: job.config.machine_name.clone(),
                }));
            }
            Err(e) => return Err(e.into()),
        };

        if !machine.is_running() {
            if machine.state() == PowerState::Stopped {
                machine.start().await?;
                return Ok(Dispatched::Deferred("machine starting"));
            }
            return Ok(Dispatched::Deferred("machine changing power state"));
        }

        if !machine.is_initialized().await? {
            return Ok(Dispatched::Deferred("machine initializing"));
        }

        if !machine.claim().await? {
            return Ok(Dispatched::Deferred("machine busy"));
        }

        let command_id = match machine
            .dispatch_command(&job.config.command, &job.config.output_dir)
            .await
        {
            Ok(command_id) => command_id,
            Err(e) => {
                self.release(&machine).await;
                return Err(e.into());
            }
        };

        job.start(machine.id(), command_id.as_str(), Utc::now())?;
        if let Err(e) = self.services.jobs().put(&job).await {
            warn!(
                "Job {} could not be recorded as running, command {command_id} on {} is orphaned: {e}",
                job.id,
                machine.id()
            );
            self.release(&machine).await;
            return Err(e.into());
        }
        queue.send(running, &message).await?;
        queue.delete(waiting, &delivery.receipt).await?;

        info!("Job {} running on machine {}", job.id, machine.id());
        Ok(Dispatched::Executed(job))
    }

    /// Records the outcome of finished commands and frees their machines.
    ///
    /// Commands that are still running, were cancelled, or cannot be observed
    /// leave their message in the running queue.
    pub async fn collect(&self) -> Result<Vec<Job>, SchedulerError> {
        let queue = self.services.queue();
        let running = queue.resolve(&self.config.running_queue).await?;

        let deliveries = queue
            .receive(&running, self.config.batch_size, self.config.receive_wait)
            .await?;

        let mut finished = Vec::new();
        for delivery in deliveries {
            match self.collect_one(&delivery, &running).await {
                Ok(Some(job)) => finished.push(job),
                Ok(None) => {}
                Err(e) => warn!("Collect of message failed ({:?}): {e}", e.kind()),
            }
        }

        if !finished.is_empty() {
            info!("Collect pass: {} finished", finished.len());
        }
        Ok(finished)
    }

    async fn collect_one(
        &self,
        delivery: &Delivery,
        running: &QueueHandle,
    ) -> Result<Option<Job>, SchedulerError> {
        let queue = self.services.queue();
        let message = delivery.message()?;
        let mut job = self.services.jobs().get(message.id).await?;

        if job.state != JobState::InProgress {
            // Terminal: a duplicate delivery. Queued: never launched, its
            // waiting message is still around.
            warn!(
                "Job {} is {} but was on the running queue, dropping message",
                job.id, job.state
            );
            queue.delete(running, &delivery.receipt).await?;
            return Ok(None);
        }

        let (Some(machine_id), Some(command_id)) = (job.machine_id.clone(), job.command_id.clone())
        else {
            return Err(StoreError::Malformed(format!(
                "Job {} is INPROGRESS without machine or command",
                job.id
            ))
            .into());
        };

        let mut machine = self.controller.attach(&MachineRef::Id(machine_id)).await?;
        let outcome = machine.poll_outcome(&command_id).await?;
        let download_url = machine
            .resolve_download_link(&outcome.output_url, self.config.download_ttl)
            .await?;

        job.finish(outcome.success, outcome.output_url, download_url, Utc::now())?;
        self.services.jobs().put(&job).await?;

        // The outcome is recorded; a redelivery is dropped as stale.
        if let Err(e) = queue.delete(running, &delivery.receipt).await {
            warn!("Failed to acknowledge finished job {}: {e}", job.id);
        }

        info!("Job {} finished: {}", job.id, job.state);

        if let Err(e) = machine.stop().await {
            warn!("Failed to stop machine {}: {e}", machine.id());
        }
        self.release(&machine).await;
        self.announce(&job).await;

        Ok(Some(job))
    }

    async fn release(&self, machine: &BoundMachine<'_, S::Machines, S::Availability>) {
        if let Err(e) = machine.enable().await {
            warn!("Failed to release machine {}: {e}", machine.name());
        }
    }

    async fn announce(&self, job: &Job) {
        let id = job.id.to_string();
        let output = job.output_download_url.as_deref().unwrap_or_default();
        let text = banner(
            &format!("Job {}", job.state),
            &[
                ("Job ID", id.as_str()),
                ("Machine", job.config.machine_name.as_str()),
                ("Command", job.config.command.as_str()),
                ("Output", output),
            ],
        );

        if let Err(e) = self.services.notifier().post(&Notification::new(text)).await {
            warn!("Failed to announce job {}: {e}", job.id);
        }
    }
}
