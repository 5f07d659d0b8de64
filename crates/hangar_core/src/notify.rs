use crate::constants::notify::DEFAULT_USERNAME;
use crate::error::NotifyError;

use serde::{Deserialize, Serialize};

/// Payload posted to a chat webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub username: String,
    pub text: String,
}

impl Notification {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            text: text.into(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Rejects notifications without text and fills in a missing username.
    pub fn validated(mut self) -> Result<Self, NotifyError> {
        if self.text.trim().is_empty() {
            return Err(NotifyError::InvalidRequest("Text must be specified".into()));
        }
        if self.username.trim().is_empty() {
            self.username = DEFAULT_USERNAME.to_string();
        }
        Ok(self)
    }
}

/// Framed message in the style used for machine lifecycle announcements.
pub fn banner(title: &str, lines: &[(&str, &str)]) -> String {
    let rule = "======================================";
    let body = lines
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{rule}\n{title}\n\n{body}\n{rule}")
}
