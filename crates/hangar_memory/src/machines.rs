use crate::lock;

use hangar_core::constants::machine::SENTINEL;
use hangar_core::prelude::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

struct Command {
    machine_id: String,
    probe: bool,
    output: Option<OutputDestination>,
    statuses: VecDeque<CommandStatus>,
}

#[derive(Default)]
struct Fleet {
    machines: HashMap<String, Machine>,
    initialized: HashSet<String>,
    commands: HashMap<String, Command>,
    outcomes: VecDeque<Vec<CommandStatus>>,
    probe_statuses: Vec<CommandStatus>,
    reject_commands: bool,
    calls: Vec<String>,
    next_id: u64,
}

/// A fake [`MachineProvider`] that keeps its fleet in memory.
///
/// Machines boot instantly. A machine counts as initialized once
/// [`SimulatedMachines::mark_initialized`] was called for it, which survives
/// stop/start just like the sentinel file on a real disk. Job commands
/// succeed on their first observation unless an outcome was scripted with
/// [`SimulatedMachines::script_outcome`].
#[derive(Clone, Default)]
pub struct SimulatedMachines {
    fleet: Arc<Mutex<Fleet>>,
}

impl SimulatedMachines {
    /// Adds a machine in the given state and returns its id.
    pub fn add(&self, name: &str, state: PowerState) -> String {
        let Ok(mut fleet) = self.fleet.lock() else {
            return String::new();
        };
        fleet.next_id += 1;
        let id = format!("i-{:04}", fleet.next_id);
        fleet.machines.insert(
            id.clone(),
            Machine {
                id: id.clone(),
                name: name.to_string(),
                state,
                public_dns_name: Some(format!("{name}.compute.internal")),
            },
        );
        id
    }

    pub fn mark_initialized(&self, id: &str) {
        if let Ok(mut fleet) = self.fleet.lock() {
            fleet.initialized.insert(id.to_string());
        }
    }

    /// Statuses reported, in order, by the next dispatched job command.
    /// The last status repeats once the sequence is exhausted.
    pub fn script_outcome(&self, statuses: impl IntoIterator<Item = CommandStatus>) {
        if let Ok(mut fleet) = self.fleet.lock() {
            fleet.outcomes.push_back(statuses.into_iter().collect());
        }
    }

    /// Statuses reported by every sentinel probe, overriding the simulated result.
    pub fn script_probe(&self, statuses: impl IntoIterator<Item = CommandStatus>) {
        if let Ok(mut fleet) = self.fleet.lock() {
            fleet.probe_statuses = statuses.into_iter().collect();
        }
    }

    /// Makes every subsequent job command submission fail.
    pub fn reject_commands(&self, reject: bool) {
        if let Ok(mut fleet) = self.fleet.lock() {
            fleet.reject_commands = reject;
        }
    }

    pub fn state(&self, id: &str) -> Option<PowerState> {
        self.fleet
            .lock()
            .ok()
            .and_then(|fleet| fleet.machines.get(id).map(|m| m.state))
    }

    /// Provider calls that changed state, e.g. `start i-0001`.
    pub fn calls(&self) -> Vec<String> {
        self.fleet
            .lock()
            .map(|fleet| fleet.calls.clone())
            .unwrap_or_default()
    }

    fn transition(&self, id: &str, verb: &str, to: PowerState) -> Result<(), MachineError> {
        let mut fleet = lock(&self.fleet, MachineError::System)?;
        fleet.calls.push(format!("{verb} {id}"));
        let machine = fleet
            .machines
            .get_mut(id)
            .ok_or_else(|| MachineError::NotFound(id.to_string()))?;

        if machine.state == PowerState::Terminated {
            return Err(MachineError::InvalidRequest(format!(
                "Machine {id} is terminated"
            )));
        }
        machine.state = to;
        Ok(())
    }
}

impl MachineProvider for SimulatedMachines {
    async fn find_by_name(&self, name: &str, states: &[PowerState]) -> Result<Machine, MachineError> {
        let fleet = lock(&self.fleet, MachineError::System)?;
        fleet
            .machines
            .values()
            .find(|m| m.name == name && states.contains(&m.state))
            .cloned()
            .ok_or_else(|| MachineError::NotFound(name.to_string()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Machine, MachineError> {
        let fleet = lock(&self.fleet, MachineError::System)?;
        fleet
            .machines
            .get(id)
            .cloned()
            .ok_or_else(|| MachineError::NotFound(id.to_string()))
    }

    async fn create(&self, spec: &LaunchSpec) -> Result<Machine, MachineError> {
        let id = self.add(&spec.name, PowerState::Running);
        let mut fleet = lock(&self.fleet, MachineError::System)?;
        fleet.calls.push(format!("create {id}"));
        fleet
            .machines
            .get(&id)
            .cloned()
            .ok_or_else(|| MachineError::System(format!("Machine {id} vanished")))
    }

    async fn start(&self, id: &str) -> Result<(), MachineError> {
        self.transition(id, "start", PowerState::Running)
    }

    async fn stop(&self, id: &str) -> Result<(), MachineError> {
        self.transition(id, "stop", PowerState::Stopped)
    }

    async fn terminate(&self, id: &str) -> Result<(), MachineError> {
        self.transition(id, "terminate", PowerState::Terminated)
    }

    async fn run_command(
        &self,
        machine_id: &str,
        command: &str,
        output: Option<&OutputDestination>,
    ) -> Result<String, MachineError> {
        let mut fleet = lock(&self.fleet, MachineError::System)?;
        match fleet.machines.get(machine_id) {
            Some(machine) if machine.is_running() => {}
            Some(machine) => {
                return Err(MachineError::InvalidRequest(format!(
                    "Machine {machine_id} is {}",
                    machine.state
                )));
            }
            None => return Err(MachineError::NotFound(machine_id.to_string())),
        }

        let probe = command.contains(SENTINEL);
        if !probe && fleet.reject_commands {
            return Err(MachineError::System("Command submission rejected".into()));
        }

        let statuses: VecDeque<CommandStatus> = if probe {
            fleet.probe_statuses.iter().copied().collect()
        } else {
            fleet.outcomes.pop_front().unwrap_or_default().into()
        };

        fleet.next_id += 1;
        let command_id = format!("cmd-{}", fleet.next_id);
        debug!("Simulated command {command_id} on {machine_id}: {command}");

        fleet.commands.insert(
            command_id.clone(),
            Command {
                machine_id: machine_id.to_string(),
                probe,
                output: output.cloned(),
                statuses,
            },
        );
        Ok(command_id)
    }

    async fn command_report(
        &self,
        machine_id: &str,
        command_id: &str,
    ) -> Result<CommandReport, MachineError> {
        let mut guard = lock(&self.fleet, MachineError::System)?;
        let Fleet {
            commands,
            initialized,
            ..
        } = &mut *guard;

        let command = commands
            .get_mut(command_id)
            .filter(|c| c.machine_id == machine_id)
            .ok_or_else(|| MachineError::NotFound(format!("{command_id} on {machine_id}")))?;

        let status = if command.statuses.len() > 1 {
            command.statuses.pop_front()
        } else {
            command.statuses.front().copied()
        }
        .unwrap_or(CommandStatus::Success);

        let stdout = command.probe.then(|| {
            if initialized.contains(machine_id) {
                "1".to_string()
            } else {
                "0".to_string()
            }
        });

        let output_url = command
            .output
            .as_ref()
            .map(|dest| dest.join(&format!("{command_id}/{machine_id}/stdout")));

        Ok(CommandReport {
            status,
            output_url,
            stdout,
        })
    }

    async fn presign(&self, output_url: &str, ttl: Duration) -> Result<String, MachineError> {
        let path = output_url.strip_prefix("s3://").ok_or_else(|| {
            MachineError::InvalidRequest(format!("Cannot presign '{output_url}'"))
        })?;
        Ok(format!(
            "https://signed.invalid/{path}?expires_in={}",
            ttl.as_secs()
        ))
    }
}
