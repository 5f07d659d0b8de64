//! # Hangar Slack
//!
//! A [`Notifier`] posting `{username, text}` payloads to a Slack-compatible
//! incoming webhook.
//!
//! ```no_run
//! use hangar_core::prelude::*;
//! use hangar_slack::WebhookNotifier;
//!
//! # async fn run() -> Result<(), NotifyError> {
//! let notifier = WebhookNotifier::new("https://hooks.slack.com/services/T000/B000/XXXX");
//! notifier.post(&Notification::new("Machine builder created")).await?;
//! # Ok(())
//! # }
//! ```

use hangar_core::constants::notify::DEFAULT_USERNAME;
use hangar_core::prelude::*;

use reqwest::Client;
use std::collections::HashMap;
use tracing::debug;

/// Secret key holding the webhook URL.
pub const WEBHOOK_URL_KEY: &str = "webhook_url";
/// Optional secret key overriding the posting username.
pub const USERNAME_KEY: &str = "username";

#[derive(Clone, Debug)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    username: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            username: None,
        }
    }

    /// Username used for notifications that do not carry their own.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Builds a notifier from a loaded secret (see [`SecretStore`]).
    pub fn from_secret(secret: &HashMap<String, String>) -> Result<Self, SecretError> {
        let url = secret
            .get(WEBHOOK_URL_KEY)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| SecretError::Malformed(format!("missing '{WEBHOOK_URL_KEY}'")))?;

        let notifier = Self::new(url.clone());
        Ok(match secret.get(USERNAME_KEY) {
            Some(username) => notifier.with_username(username.clone()),
            None => notifier,
        })
    }
}

impl Notifier for WebhookNotifier {
    async fn post(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut notification = notification.clone();
        if let (Some(username), true) = (&self.username, notification.username == DEFAULT_USERNAME) {
            notification.username = username.clone();
        }
        let notification = notification.validated()?;

        let response = self
            .client
            .post(&self.url)
            .json(&notification)
            .send()
            .await
            .map_err(|e| NotifyError::System(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(NotifyError::System(format!("Webhook answered {status}: {text}")));
        }

        debug!("Posted notification as {}", notification.username);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Received = Arc<Mutex<Vec<Value>>>;

    async fn hook(State(received): State<Received>, Json(body): Json<Value>) -> StatusCode {
        received.lock().unwrap().push(body);
        StatusCode::OK
    }

    async fn serve(status: StatusCode) -> (String, Received) {
        let received = Received::default();
        let app = Router::new()
            .route("/hook", post(hook))
            .route("/broken", post(move || async move { status }))
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), received)
    }

    #[tokio::test]
    async fn test_posts_payload() {
        let (base, received) = serve(StatusCode::OK).await;
        let notifier = WebhookNotifier::new(format!("{base}/hook")).with_username("ci-bot");

        notifier.post(&Notification::new("Job SUCCESS")).await.unwrap();
        notifier
            .post(&Notification::new("explicit").with_username("ops"))
            .await
            .unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received[0]["username"], "ci-bot");
        assert_eq!(received[0]["text"], "Job SUCCESS");
        assert_eq!(received[1]["username"], "ops");
    }

    #[tokio::test]
    async fn test_error_status() {
        let (base, _) = serve(StatusCode::INTERNAL_SERVER_ERROR).await;
        let notifier = WebhookNotifier::new(format!("{base}/broken"));

        assert!(matches!(
            notifier.post(&Notification::new("hi")).await,
            Err(NotifyError::System(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/unreachable");
        assert!(matches!(
            notifier.post(&Notification::new("")).await,
            Err(NotifyError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_from_secret() {
        let secret = HashMap::from([
            (WEBHOOK_URL_KEY.to_string(), "https://hooks.example.com/x".to_string()),
            (USERNAME_KEY.to_string(), "ci".to_string()),
        ]);
        let notifier = WebhookNotifier::from_secret(&secret).unwrap();
        assert_eq!(notifier.username.as_deref(), Some("ci"));

        assert!(WebhookNotifier::from_secret(&HashMap::new()).is_err());
    }
}
