use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested record (job, availability flag) does not exist.
    /// Recoverable: the caller skips and retries later.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record exists but does not have the expected shape.
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// Generic system or backend-specific failure (e.g., DynamoDB error).
    #[error("Store system failure: {0}")]
    System(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    /// The named queue does not exist.
    #[error("Queue {0} not found")]
    NotFound(String),

    /// A received message body is not a `{"id": ...}` envelope.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// The receipt handle does not identify an outstanding delivery.
    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    /// Generic system or backend-specific failure (e.g., SQS error).
    #[error("Queue system failure: {0}")]
    System(String),
}

#[derive(Debug, Error)]
pub enum MachineError {
    /// No machine matches the requested name or id.
    #[error("Machine {0} does not exist")]
    NotFound(String),

    /// The sentinel probe was cancelled, failed, or never reported back.
    #[error("Machine initialization failure: {0}")]
    InitializationFailure(String),

    /// A remote observation did not reach a terminal state within its poll budget.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The remote side explicitly cancelled the command.
    #[error("Command {0} was cancelled")]
    Cancelled(String),

    /// The caller provided invalid arguments (e.g., a malformed output destination).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal infrastructure or provider failure (e.g., EC2 or SSM error).
    #[error("Machine system failure: {0}")]
    System(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The notification was rejected before sending (e.g., empty text).
    #[error("Invalid notification: {0}")]
    InvalidRequest(String),

    /// The webhook could not be reached or answered with an error.
    #[error("Notification failure: {0}")]
    System(String),
}

#[derive(Debug, Error)]
pub enum SecretError {
    /// The secret does not exist.
    #[error("Secret {0} not found")]
    NotFound(String),

    /// The secret is not a flat JSON object of strings.
    #[error("Malformed secret: {0}")]
    Malformed(String),

    /// Generic system or provider failure (e.g., Secrets Manager error).
    #[error("Secret system failure: {0}")]
    System(String),
}

/// Coarse classification used to decide between "retry later", "tell the user" and "bug".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    MachineDoesNotExist,
    InitializationFailure,
    Timeout,
    Cancelled,
    Fatal,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Machine(#[from] MachineError),

    /// A job transition was attempted from the wrong state.
    #[error("Invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    /// A submission was rejected before anything was recorded.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl SchedulerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            SchedulerError::Queue(QueueError::NotFound(_) | QueueError::InvalidReceipt(_)) => {
                ErrorKind::NotFound
            }
            SchedulerError::Machine(err) => match err {
                MachineError::NotFound(_) => ErrorKind::MachineDoesNotExist,
                MachineError::InitializationFailure(_) => ErrorKind::InitializationFailure,
                MachineError::Timeout(_) => ErrorKind::Timeout,
                MachineError::Cancelled(_) => ErrorKind::Cancelled,
                MachineError::InvalidRequest(_) | MachineError::System(_) => ErrorKind::Fatal,
            },
            _ => ErrorKind::Fatal,
        }
    }

    /// Whether re-invoking the same pass later can succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::InitializationFailure | ErrorKind::Timeout
        )
    }
}
