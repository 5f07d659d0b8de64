//! Backends chosen at startup.

use hangar_aws::DynamoAvailability;
use hangar_core::prelude::*;
use hangar_memory::MemoryAvailability;
use hangar_slack::WebhookNotifier;

/// Where machine availability flags live.
#[derive(Clone, Debug)]
pub enum Availability {
    /// Process-local; only meaningful for a single long-running `serve` or `worker`.
    Memory(MemoryAvailability),
    Dynamo(DynamoAvailability),
}

impl AvailabilityStore for Availability {
    async fn set(&self, name: &str, available: bool) -> Result<(), StoreError> {
        match self {
            Availability::Memory(store) => store.set(name, available).await,
            Availability::Dynamo(store) => store.set(name, available).await,
        }
    }

    async fn get(&self, name: &str) -> Result<bool, StoreError> {
        match self {
            Availability::Memory(store) => store.get(name).await,
            Availability::Dynamo(store) => store.get(name).await,
        }
    }

    async fn try_claim(&self, name: &str) -> Result<bool, StoreError> {
        match self {
            Availability::Memory(store) => store.try_claim(name).await,
            Availability::Dynamo(store) => store.try_claim(name).await,
        }
    }

    async fn remove(&self, name: &str) -> Result<(), StoreError> {
        match self {
            Availability::Memory(store) => store.remove(name).await,
            Availability::Dynamo(store) => store.remove(name).await,
        }
    }
}

/// Posts to the configured webhook, or nowhere when none is configured.
#[derive(Clone, Debug, Default)]
pub struct Announcer(pub Option<WebhookNotifier>);

impl Notifier for Announcer {
    async fn post(&self, notification: &Notification) -> Result<(), NotifyError> {
        match &self.0 {
            Some(webhook) => webhook.post(notification).await,
            None => NoNotifier.post(notification).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_availability() {
        let store = Availability::Memory(MemoryAvailability::default());
        store.set("builder", true).await.unwrap();

        assert!(store.try_claim("builder").await.unwrap());
        assert!(!store.try_claim("builder").await.unwrap());

        store.remove("builder").await.unwrap();
        assert!(matches!(
            store.get("builder").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_announcer() {
        assert!(Announcer::default().post(&Notification::new("hi")).await.is_ok());
    }
}
