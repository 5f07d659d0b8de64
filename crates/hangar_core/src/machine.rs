use crate::constants::machine::*;
use crate::error::MachineError;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Power state as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
}

impl PowerState {
    /// States in which a machine can be attached to by name.
    pub const ATTACHABLE: [PowerState; 3] =
        [PowerState::Pending, PowerState::Running, PowerState::Stopped];

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::Pending => "pending",
            PowerState::Running => "running",
            PowerState::Stopping => "stopping",
            PowerState::Stopped => "stopped",
            PowerState::ShuttingDown => "shutting-down",
            PowerState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = MachineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PowerState::Pending),
            "running" => Ok(PowerState::Running),
            "stopping" => Ok(PowerState::Stopping),
            "stopped" => Ok(PowerState::Stopped),
            "shutting-down" => Ok(PowerState::ShuttingDown),
            "terminated" => Ok(PowerState::Terminated),
            other => Err(MachineError::System(format!("Unknown power state '{other}'"))),
        }
    }
}

/// A snapshot of a provisioned machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    /// Provider-assigned instance id.
    pub id: String,
    /// Value of the `Name` tag, used for lookup before the id is known.
    pub name: String,
    pub state: PowerState,
    pub public_dns_name: Option<String>,
}

impl Machine {
    pub fn is_running(&self) -> bool {
        self.state == PowerState::Running
    }
}

/// How to find a machine when attaching to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineRef {
    Name(String),
    Id(String),
}

impl fmt::Display for MachineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineRef::Name(name) => write!(f, "name={name}"),
            MachineRef::Id(id) => write!(f, "id={id}"),
        }
    }
}

/// Instance class presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceSize {
    #[default]
    Small,
    Medium,
    Large,
    Huge,
}

impl InstanceSize {
    pub fn instance_type(&self) -> &'static str {
        match self {
            InstanceSize::Small => "t2.micro",
            InstanceSize::Medium => "t3.medium",
            InstanceSize::Large => "t3.2xlarge",
            InstanceSize::Huge => "m5.24xlarge",
        }
    }
}

impl FromStr for InstanceSize {
    type Err = MachineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(InstanceSize::Small),
            "medium" => Ok(InstanceSize::Medium),
            "large" => Ok(InstanceSize::Large),
            "huge" => Ok(InstanceSize::Huge),
            other => Err(MachineError::InvalidRequest(format!(
                "Unknown instance size '{other}', expected small, medium, large or huge"
            ))),
        }
    }
}

/// Everything needed to provision a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub image_id: String,
    pub instance_type: String,
    pub device_name: String,
    pub volume_size_gb: i32,
    pub key_name: Option<String>,
    /// Value of the `Name` tag.
    pub name: String,
    /// Additional instance tags.
    pub tags: BTreeMap<String, String>,
    /// Full user-data script, already wrapped by [`LaunchSpec::bootstrap_script`].
    pub user_data: String,
}

impl Default for LaunchSpec {
    fn default() -> Self {
        Self {
            image_id: DEFAULT_IMAGE.to_string(),
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            device_name: DEFAULT_DEVICE.to_string(),
            volume_size_gb: DEFAULT_VOLUME_GB,
            key_name: None,
            name: format!("{DEFAULT_NAME}-{}", uuid::Uuid::new_v4()),
            tags: BTreeMap::new(),
            user_data: Self::bootstrap_script(None),
        }
    }
}

impl LaunchSpec {
    /// Defaults merged with the caller's overrides.
    pub fn from_overrides(overrides: LaunchOverrides) -> Self {
        let mut spec = Self::default();
        if let Some(size) = overrides.size {
            spec.instance_type = size.instance_type().to_string();
        }
        if let Some(image_id) = overrides.image_id {
            spec.image_id = image_id;
        }
        if let Some(instance_type) = overrides.instance_type {
            spec.instance_type = instance_type;
        }
        if let Some(volume) = overrides.volume_size_gb {
            spec.volume_size_gb = volume;
        }
        if overrides.key_name.is_some() {
            spec.key_name = overrides.key_name;
        }
        if let Some(name) = overrides.name {
            spec.name = name;
        }
        spec.tags.extend(overrides.tags);
        spec.user_data = Self::bootstrap_script(overrides.user_data.as_deref());
        spec
    }

    /// Wraps the caller's user-data so that the sentinel file is written once it completes.
    pub fn bootstrap_script(user_data: Option<&str>) -> String {
        let body = user_data
            .map(|script| script.trim_start_matches("#!/bin/bash").trim())
            .unwrap_or_default();

        format!(
            "#!/bin/bash\nset -e\n\n{body}\n\nmkdir -p \"$(dirname {SENTINEL})\"\ntouch {SENTINEL}\n"
        )
    }
}

/// Caller overrides for [`LaunchSpec`]. Unset fields keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOverrides {
    pub size: Option<InstanceSize>,
    pub image_id: Option<String>,
    /// Takes precedence over [`LaunchOverrides::size`].
    pub instance_type: Option<String>,
    pub volume_size_gb: Option<i32>,
    pub key_name: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub user_data: Option<String>,
}

/// A parsed `s3://bucket/prefix` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDestination {
    pub bucket: String,
    pub prefix: String,
}

impl OutputDestination {
    pub fn join(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        if self.prefix.is_empty() {
            format!("s3://{}/{key}", self.bucket)
        } else {
            format!("s3://{}/{}/{key}", self.bucket, self.prefix)
        }
    }
}

impl FromStr for OutputDestination {
    type Err = MachineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("s3://").ok_or_else(|| {
            MachineError::InvalidRequest(format!("Output destination '{s}' is not an s3:// URI"))
        })?;

        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(MachineError::InvalidRequest(format!(
                "Output destination '{s}' has no bucket"
            )));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        })
    }
}

impl fmt::Display for OutputDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "s3://{}", self.bucket)
        } else {
            write!(f, "s3://{}/{}", self.bucket, self.prefix)
        }
    }
}

/// Remote command status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    Pending,
    InProgress,
    Delayed,
    Success,
    Failed,
    Cancelled,
    TimedOut,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            CommandStatus::Pending | CommandStatus::InProgress | CommandStatus::Delayed
        )
    }
}

/// One observation of a remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub status: CommandStatus,
    /// Where the provider wrote the command's standard output.
    pub output_url: Option<String>,
    /// Inline standard output, if the provider returns it.
    pub stdout: Option<String>,
}

/// Terminal result of a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub output_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_destination_parse() {
        let dest: OutputDestination = "s3://artifacts/builds/nightly/".parse().unwrap();
        assert_eq!(dest.bucket, "artifacts");
        assert_eq!(dest.prefix, "builds/nightly");
        assert_eq!(dest.to_string(), "s3://artifacts/builds/nightly");
        assert_eq!(dest.join("cmd-1/stdout"), "s3://artifacts/builds/nightly/cmd-1/stdout");

        let bare: OutputDestination = "s3://artifacts".parse().unwrap();
        assert_eq!(bare.prefix, "");
        assert_eq!(bare.join("/x"), "s3://artifacts/x");

        assert!("https://artifacts/builds".parse::<OutputDestination>().is_err());
        assert!("s3:///builds".parse::<OutputDestination>().is_err());
    }

    #[test]
    fn test_launch_overrides_merge() {
        let spec = LaunchSpec::from_overrides(LaunchOverrides {
            size: Some(InstanceSize::Large),
            name: Some("builder".into()),
            volume_size_gb: Some(100),
            ..Default::default()
        });

        assert_eq!(spec.instance_type, "t3.2xlarge");
        assert_eq!(spec.name, "builder");
        assert_eq!(spec.volume_size_gb, 100);
        assert_eq!(spec.image_id, DEFAULT_IMAGE);

        let spec = LaunchSpec::from_overrides(LaunchOverrides {
            size: Some(InstanceSize::Large),
            instance_type: Some("c5.large".into()),
            ..Default::default()
        });
        assert_eq!(spec.instance_type, "c5.large");
        assert!(spec.name.starts_with("hangar-"));
    }

    #[test]
    fn test_bootstrap_script_marks_sentinel_last() {
        let script = LaunchSpec::bootstrap_script(Some("#!/bin/bash\napt-get update\n"));
        assert!(script.starts_with("#!/bin/bash"));
        assert_eq!(script.matches("#!/bin/bash").count(), 1);
        let update = script.find("apt-get update").unwrap();
        let touch = script.find(&format!("touch {SENTINEL}")).unwrap();
        assert!(update < touch);
    }

    #[test]
    fn test_instance_size() {
        assert_eq!("huge".parse::<InstanceSize>().unwrap().instance_type(), "m5.24xlarge");
        assert!(matches!(
            "tiny".parse::<InstanceSize>(),
            Err(MachineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_power_state_roundtrip() {
        for state in [PowerState::ShuttingDown, PowerState::Stopped] {
            assert_eq!(state.as_str().parse::<PowerState>().unwrap(), state);
        }
    }
}
