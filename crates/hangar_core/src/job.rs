use crate::error::SchedulerError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What to run, where to put its output and which machine to run it on.
///
/// Immutable once the job has been submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Shell command executed on the machine.
    pub command: String,
    /// Output destination URI, e.g. `s3://bucket/prefix`.
    pub output_dir: String,
    /// `Name` of the machine the job is bound to.
    pub machine_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Queued,
    InProgress,
    Success,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::InProgress => "INPROGRESS",
            JobState::Success => "SUCCESS",
            JobState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(JobState::Queued),
            "INPROGRESS" => Ok(JobState::InProgress),
            "SUCCESS" => Ok(JobState::Success),
            "FAILED" => Ok(JobState::Failed),
            other => Err(format!("unknown job state '{other}'")),
        }
    }
}

/// The durable job record.
///
/// `machine_id`, `command_id` and `executed_at` are set once the job leaves
/// [`JobState::Queued`]; `success`, `output_url`, `output_download_url` and
/// `done_at` once it reaches a terminal state. Use [`Job::start`] and
/// [`Job::finish`] to move between states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub state: JobState,
    pub config: JobConfig,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    pub done_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a fresh [`JobState::Queued`] record with a random id.
    pub fn new(config: JobConfig, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: JobState::Queued,
            config,
            created_at: timestamp::truncate(now),
            machine_id: None,
            command_id: None,
            executed_at: None,
            success: None,
            output_url: None,
            output_download_url: None,
            done_at: None,
        }
    }

    /// QUEUED -> INPROGRESS.
    pub fn start(
        &mut self,
        machine_id: impl Into<String>,
        command_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        self.expect_state(JobState::Queued, JobState::InProgress)?;
        self.machine_id = Some(machine_id.into());
        self.command_id = Some(command_id.into());
        self.executed_at = Some(timestamp::truncate(now));
        self.state = JobState::InProgress;
        Ok(())
    }

    /// INPROGRESS -> SUCCESS | FAILED.
    pub fn finish(
        &mut self,
        success: bool,
        output_url: impl Into<String>,
        output_download_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        let next = if success {
            JobState::Success
        } else {
            JobState::Failed
        };
        self.expect_state(JobState::InProgress, next)?;
        self.success = Some(success);
        self.output_url = Some(output_url.into());
        self.output_download_url = Some(output_download_url.into());
        self.done_at = Some(timestamp::truncate(now));
        self.state = next;
        Ok(())
    }

    /// Checks that the optional fields match the current state.
    pub fn is_consistent(&self) -> bool {
        let dispatched =
            self.machine_id.is_some() && self.command_id.is_some() && self.executed_at.is_some();
        let undispatched =
            self.machine_id.is_none() && self.command_id.is_none() && self.executed_at.is_none();
        let finished = self.success.is_some() && self.output_url.is_some() && self.done_at.is_some();
        let unfinished = self.success.is_none()
            && self.output_url.is_none()
            && self.output_download_url.is_none()
            && self.done_at.is_none();

        match self.state {
            JobState::Queued => undispatched && unfinished,
            JobState::InProgress => dispatched && unfinished,
            JobState::Success | JobState::Failed => dispatched && finished,
        }
    }

    fn expect_state(&self, from: JobState, to: JobState) -> Result<(), SchedulerError> {
        if self.state != from {
            return Err(SchedulerError::InvalidTransition {
                id: self.id.to_string(),
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

/// Body of a queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub id: Uuid,
}

/// Machine-readable code of a dispatch error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchErrorCode {
    MachineDoesNotExist,
}

/// A "this job can never run as configured" condition reported by dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchFailure {
    pub id: Uuid,
    pub code: DispatchErrorCode,
    pub message: String,
}

/// The outcome of one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Jobs moved to [`JobState::InProgress`] during this pass.
    #[serde(rename = "jobs")]
    pub executed: Vec<Job>,
    pub errors: Vec<DispatchFailure>,
}

impl DispatchReport {
    pub fn is_empty(&self) -> bool {
        self.executed.is_empty() && self.errors.is_empty()
    }
}

/// ISO-8601 timestamps with second precision (`2026-01-01T01:00:00`), always UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn truncate(at: DateTime<Utc>) -> DateTime<Utc> {
        at.trunc_subsecs(0)
    }

    pub fn format(at: &DateTime<Utc>) -> String {
        at.format(FORMAT).to_string()
    }

    pub fn parse(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        NaiveDateTime::parse_from_str(value, FORMAT).map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            at: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match at {
                Some(at) => serializer.serialize_str(&super::format(at)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| super::parse(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> JobConfig {
        JobConfig {
            command: "./build-all.sh".into(),
            output_dir: "s3://artifacts/builds".into(),
            machine_name: "builder".into(),
        }
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = Job::new(config(), Utc::now());
        assert_eq!(job.state, JobState::Queued);
        assert!(job.is_consistent());
    }

    #[test]
    fn test_lifecycle() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        let mut job = Job::new(config(), created);

        job.start("i-0123", "cmd-1", created + chrono::Duration::seconds(5))
            .unwrap();
        assert_eq!(job.state, JobState::InProgress);
        assert!(job.is_consistent());

        job.finish(
            false,
            "s3://artifacts/builds/cmd-1/stdout",
            "https://signed",
            created + chrono::Duration::seconds(60),
        )
        .unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.success, Some(false));
        assert!(job.is_consistent());
        assert!(job.done_at >= job.executed_at);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut job = Job::new(config(), Utc::now());
        assert!(job.finish(true, "a", "b", Utc::now()).is_err());

        job.start("i-0123", "cmd-1", Utc::now()).unwrap();
        let err = job.start("i-0123", "cmd-2", Utc::now()).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTransition { .. }));
        assert_eq!(job.command_id.as_deref(), Some("cmd-1"));
    }

    #[test]
    fn test_record_shape() {
        let created = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let job = Job::new(config(), created);
        let value = serde_json::to_value(&job).unwrap();

        assert_eq!(value["state"], "QUEUED");
        assert_eq!(value["created_at"], "2026-03-04T05:06:07");
        assert_eq!(value["config"]["machine_name"], "builder");
        assert!(value.get("machine_id").is_none());

        let decoded: Job = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(
            serde_json::to_value(JobState::InProgress).unwrap(),
            "INPROGRESS"
        );
        assert_eq!("SUCCESS".parse::<JobState>(), Ok(JobState::Success));
        assert!("DONE".parse::<JobState>().is_err());
    }

    #[test]
    fn test_dispatch_error_code() {
        let failure = DispatchFailure {
            id: Uuid::nil(),
            code: DispatchErrorCode::MachineDoesNotExist,
            message: "builder".into(),
        };
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value["code"], "machine_does_not_exist");
    }
}
