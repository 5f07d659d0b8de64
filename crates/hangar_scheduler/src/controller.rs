//! Operations on provisioned machines.
//!
//! A [`MachineController`] is unbound: it only holds the provider, the
//! availability registry and the poll budget. Attaching to (or creating) a
//! machine yields a [`BoundMachine`], which carries the machine snapshot and
//! exposes everything that needs one.

use crate::poll::PollPolicy;
use crate::registry::MachineRegistry;

use hangar_core::constants::machine::SENTINEL;
use hangar_core::prelude::*;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub struct MachineController<M, A> {
    provider: M,
    registry: MachineRegistry<A>,
    poll: PollPolicy,
}

impl<M, A> MachineController<M, A>
where
    M: MachineProvider,
    A: AvailabilityStore,
{
    pub fn new(provider: M, availability: A, poll: PollPolicy) -> Self {
        Self {
            provider,
            registry: MachineRegistry::new(availability),
            poll,
        }
    }

    pub fn registry(&self) -> &MachineRegistry<A> {
        &self.registry
    }

    pub fn provider(&self) -> &M {
        &self.provider
    }

    /// Binds to an existing machine.
    ///
    /// By name, only machines that are pending, running or stopped are considered.
    pub async fn attach(&self, target: &MachineRef) -> Result<BoundMachine<'_, M, A>, MachineError> {
        let machine = match target {
            MachineRef::Name(name) => {
                self.provider
                    .find_by_name(name, &PowerState::ATTACHABLE)
                    .await?
            }
            MachineRef::Id(id) => self.provider.find_by_id(id).await?,
        };

        debug!("Attached to machine {} ({})", machine.name, machine.id);
        Ok(BoundMachine {
            controller: self,
            machine,
        })
    }

    /// Provisions a new machine and registers it as available.
    pub async fn create(
        &self,
        overrides: LaunchOverrides,
    ) -> Result<BoundMachine<'_, M, A>, SchedulerError> {
        let spec = LaunchSpec::from_overrides(overrides);
        let machine = self.provider.create(&spec).await?;
        self.registry.set_available(&machine.name, true).await?;

        info!(
            "Created machine {} ({}, {})",
            machine.name, machine.id, spec.instance_type
        );
        Ok(BoundMachine {
            controller: self,
            machine,
        })
    }
}

/// A controller bound to one machine.
pub struct BoundMachine<'a, M, A> {
    controller: &'a MachineController<M, A>,
    machine: Machine,
}

impl<M, A> BoundMachine<'_, M, A>
where
    M: MachineProvider,
    A: AvailabilityStore,
{
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn id(&self) -> &str {
        &self.machine.id
    }

    pub fn name(&self) -> &str {
        &self.machine.name
    }

    pub fn state(&self) -> PowerState {
        self.machine.state
    }

    pub fn is_running(&self) -> bool {
        self.machine.is_running()
    }

    fn provider(&self) -> &M {
        &self.controller.provider
    }

    fn registry(&self) -> &MachineRegistry<A> {
        &self.controller.registry
    }

    /// Re-reads the machine snapshot from the provider.
    pub async fn refresh(&mut self) -> Result<(), MachineError> {
        self.machine = self.provider().find_by_id(&self.machine.id).await?;
        Ok(())
    }

    pub async fn start(&mut self) -> Result<(), MachineError> {
        info!("Starting machine {} ({})", self.machine.name, self.machine.id);
        self.provider().start(&self.machine.id).await?;
        self.refresh().await
    }

    pub async fn stop(&mut self) -> Result<(), MachineError> {
        info!("Stopping machine {} ({})", self.machine.name, self.machine.id);
        self.provider().stop(&self.machine.id).await?;
        self.refresh().await
    }

    /// Terminates the machine and deletes its availability record.
    pub async fn terminate(&mut self) -> Result<(), SchedulerError> {
        info!(
            "Terminating machine {} ({})",
            self.machine.name, self.machine.id
        );
        self.provider().terminate(&self.machine.id).await?;
        self.registry().forget(&self.machine.name).await?;
        self.refresh().await?;
        Ok(())
    }

    pub async fn is_available(&self) -> Result<bool, StoreError> {
        self.registry().is_available(&self.machine.name).await
    }

    /// Atomically takes the machine. Returns `false` if it is already held.
    pub async fn claim(&self) -> Result<bool, StoreError> {
        self.registry().claim(&self.machine.name).await
    }

    pub async fn enable(&self) -> Result<(), StoreError> {
        self.registry().release(&self.machine.name).await
    }

    pub async fn disable(&self) -> Result<(), StoreError> {
        self.registry().set_available(&self.machine.name, false).await
    }

    /// Probes the machine for the bootstrap sentinel file.
    ///
    /// `Ok(false)` means the probe ran and the file is missing. A probe that
    /// cannot be submitted, ends in any status other than success, or does not
    /// finish within the poll budget is an [`MachineError::InitializationFailure`].
    pub async fn is_initialized(&self) -> Result<bool, MachineError> {
        let probe = format!("if [ -f {SENTINEL} ]; then echo 1; else echo 0; fi");
        let machine_id = self.machine.id.as_str();

        let command_id = self
            .provider()
            .run_command(machine_id, &probe, None)
            .await
            .map_err(|e| MachineError::InitializationFailure(e.to_string()))?;

        let provider = self.provider();
        let probe_id = command_id.as_str();
        let report = self
            .controller
            .poll
            .run(move |_| async move {
                match provider.command_report(machine_id, probe_id).await {
                    Ok(report) if report.status.is_terminal() => Ok(Some(report)),
                    Ok(_) | Err(MachineError::NotFound(_)) => Ok(None),
                    Err(e) => Err(MachineError::InitializationFailure(e.to_string())),
                }
            })
            .await?
            .ok_or_else(|| {
                MachineError::InitializationFailure(format!(
                    "Probe {command_id} on {machine_id} did not finish"
                ))
            })?;

        match report.status {
            CommandStatus::Success => match report.stdout.as_deref().map(str::trim) {
                Some("1") => Ok(true),
                Some("0") => Ok(false),
                other => Err(MachineError::InitializationFailure(format!(
                    "Unexpected probe output {other:?}"
                ))),
            },
            status => Err(MachineError::InitializationFailure(format!(
                "Probe {command_id} on {machine_id} ended with {status:?}"
            ))),
        }
    }

    /// Retries [`BoundMachine::is_initialized`] until it reports `true`, ignoring probe failures.
    pub async fn wait_until_initialized(&self) -> Result<(), MachineError> {
        let ready = self
            .controller
            .poll
            .run(move |attempt| async move {
                match self.is_initialized().await {
                    Ok(true) => Ok::<_, MachineError>(Some(())),
                    Ok(false) => Ok(None),
                    Err(e) => {
                        debug!(
                            "Initialization probe {attempt} on {} failed: {e}",
                            self.machine.id
                        );
                        Ok(None)
                    }
                }
            })
            .await?;

        ready.ok_or_else(|| {
            MachineError::Timeout(format!("Machine {} never initialized", self.machine.id))
        })
    }

    /// Submits `command` for execution with its output written below `output_dir`.
    ///
    /// Returns the command id immediately.
    pub async fn dispatch_command(
        &self,
        command: &str,
        output_dir: &str,
    ) -> Result<String, MachineError> {
        let output: OutputDestination = output_dir.parse()?;
        let command_id = self
            .provider()
            .run_command(&self.machine.id, command, Some(&output))
            .await?;

        info!(
            "Dispatched command {command_id} to machine {} ({})",
            self.machine.name, self.machine.id
        );
        Ok(command_id)
    }

    /// Polls a dispatched command until it succeeds or fails.
    ///
    /// Remote timeouts count as failures. Cancellation and an exhausted poll
    /// budget are errors, leaving the command unresolved.
    pub async fn poll_outcome(&self, command_id: &str) -> Result<CommandOutcome, MachineError> {
        let machine_id = self.machine.id.as_str();
        let provider = self.provider();

        let report = self
            .controller
            .poll
            .run(move |_| async move {
                match provider.command_report(machine_id, command_id).await {
                    Ok(report) if report.status.is_terminal() => Ok(Some(report)),
                    Ok(_) | Err(MachineError::NotFound(_)) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await?
            .ok_or_else(|| {
                MachineError::Timeout(format!("Command {command_id} on {machine_id}"))
            })?;

        let success = match report.status {
            CommandStatus::Success => true,
            CommandStatus::Failed | CommandStatus::TimedOut => false,
            CommandStatus::Cancelled => {
                return Err(MachineError::Cancelled(command_id.to_string()));
            }
            status => {
                return Err(MachineError::System(format!(
                    "Command {command_id} reported non-terminal status {status:?}"
                )));
            }
        };

        let output_url = report.output_url.ok_or_else(|| {
            MachineError::System(format!("Command {command_id} has no output location"))
        })?;

        Ok(CommandOutcome {
            success,
            output_url,
        })
    }

    /// Produces a time-limited download link for a command's output.
    pub async fn resolve_download_link(
        &self,
        output_url: &str,
        ttl: Duration,
    ) -> Result<String, MachineError> {
        self.provider().presign(output_url, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hangar_memory::{MemoryAvailability, SimulatedMachines};

    fn controller(
        fleet: &SimulatedMachines,
        flags: &MemoryAvailability,
    ) -> MachineController<SimulatedMachines, MemoryAvailability> {
        MachineController::new(
            fleet.clone(),
            flags.clone(),
            PollPolicy::new(5, Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn test_attach_missing_machine() {
        let fleet = SimulatedMachines::default();
        let flags = MemoryAvailability::default();
        let ctl = controller(&fleet, &flags);

        let err = ctl
            .attach(&MachineRef::Name("builder".into()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MachineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_registers_available() {
        let fleet = SimulatedMachines::default();
        let flags = MemoryAvailability::default();
        let ctl = controller(&fleet, &flags);

        let machine = ctl
            .create(LaunchOverrides {
                name: Some("builder".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(machine.name(), "builder");
        assert!(machine.is_available().await.unwrap());
    }

    #[tokio::test]
    async fn test_terminate_forgets_availability() {
        let fleet = SimulatedMachines::default();
        let flags = MemoryAvailability::default();
        let ctl = controller(&fleet, &flags);
        let id = fleet.add("builder", PowerState::Running);
        flags.set("builder", true).await.unwrap();

        let mut machine = ctl.attach(&MachineRef::Id(id)).await.unwrap();
        machine.terminate().await.unwrap();

        assert_eq!(machine.state(), PowerState::Terminated);
        assert!(matches!(
            machine.is_available().await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_is_initialized() {
        let fleet = SimulatedMachines::default();
        let flags = MemoryAvailability::default();
        let ctl = controller(&fleet, &flags);
        let id = fleet.add("builder", PowerState::Running);

        let machine = ctl.attach(&MachineRef::Name("builder".into())).await.unwrap();
        assert!(!machine.is_initialized().await.unwrap());

        fleet.mark_initialized(&id);
        assert!(machine.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_probe_failures() {
        let fleet = SimulatedMachines::default();
        let flags = MemoryAvailability::default();
        let ctl = controller(&fleet, &flags);
        fleet.add("builder", PowerState::Running);
        let machine = ctl.attach(&MachineRef::Name("builder".into())).await.unwrap();

        fleet.script_probe([CommandStatus::Cancelled]);
        assert!(matches!(
            machine.is_initialized().await,
            Err(MachineError::InitializationFailure(_))
        ));

        fleet.script_probe([CommandStatus::InProgress]);
        assert!(matches!(
            machine.is_initialized().await,
            Err(MachineError::InitializationFailure(_))
        ));

        assert!(matches!(
            machine.wait_until_initialized().await,
            Err(MachineError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_until_initialized() {
        let fleet = SimulatedMachines::default();
        let flags = MemoryAvailability::default();
        let ctl = controller(&fleet, &flags);
        let id = fleet.add("builder", PowerState::Running);
        fleet.mark_initialized(&id);

        let machine = ctl.attach(&MachineRef::Id(id)).await.unwrap();
        assert!(machine.wait_until_initialized().await.is_ok());
    }

    #[tokio::test]
    async fn test_poll_outcome() {
        let fleet = SimulatedMachines::default();
        let flags = MemoryAvailability::default();
        let ctl = controller(&fleet, &flags);
        fleet.add("builder", PowerState::Running);
        let machine = ctl.attach(&MachineRef::Name("builder".into())).await.unwrap();

        fleet.script_outcome([CommandStatus::Pending, CommandStatus::Failed]);
        let cmd = machine
            .dispatch_command("make", "s3://out/builds")
            .await
            .unwrap();
        let outcome = machine.poll_outcome(&cmd).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.output_url.starts_with("s3://out/builds/"));

        fleet.script_outcome([CommandStatus::Cancelled]);
        let cmd = machine.dispatch_command("make", "s3://out").await.unwrap();
        assert!(matches!(
            machine.poll_outcome(&cmd).await,
            Err(MachineError::Cancelled(_))
        ));

        fleet.script_outcome([CommandStatus::InProgress]);
        let cmd = machine.dispatch_command("make", "s3://out").await.unwrap();
        assert!(matches!(
            machine.poll_outcome(&cmd).await,
            Err(MachineError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_bad_destination() {
        let fleet = SimulatedMachines::default();
        let flags = MemoryAvailability::default();
        let ctl = controller(&fleet, &flags);
        fleet.add("builder", PowerState::Running);
        let machine = ctl.attach(&MachineRef::Name("builder".into())).await.unwrap();

        assert!(matches!(
            machine.dispatch_command("make", "/tmp/out").await,
            Err(MachineError::InvalidRequest(_))
        ));
    }
}
