use crate::lock;

use hangar_core::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct MemoryJobStore {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
}

impl MemoryJobStore {
    /// Snapshot of every stored record.
    pub fn all(&self) -> Vec<Job> {
        self.jobs
            .lock()
            .map(|jobs| jobs.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl JobStore for MemoryJobStore {
    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        lock(&self.jobs, StoreError::System)?.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Job, StoreError> {
        lock(&self.jobs, StoreError::System)?
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryAvailability {
    flags: Arc<Mutex<HashMap<String, bool>>>,
}

impl AvailabilityStore for MemoryAvailability {
    async fn set(&self, name: &str, available: bool) -> Result<(), StoreError> {
        lock(&self.flags, StoreError::System)?.insert(name.to_string(), available);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<bool, StoreError> {
        lock(&self.flags, StoreError::System)?
            .get(name)
            .copied()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn try_claim(&self, name: &str) -> Result<bool, StoreError> {
        let mut flags = lock(&self.flags, StoreError::System)?;
        match flags.get_mut(name) {
            Some(available) if *available => {
                *available = false;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    async fn remove(&self, name: &str) -> Result<(), StoreError> {
        lock(&self.flags, StoreError::System)?.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_job_store_get_missing() {
        let store = MemoryJobStore::default();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_job_store_put_replaces() {
        let store = MemoryJobStore::default();
        let mut job = Job::new(
            JobConfig {
                command: "true".into(),
                output_dir: "s3://b".into(),
                machine_name: "m".into(),
            },
            Utc::now(),
        );
        store.put(&job).await.unwrap();
        job.start("i-1", "cmd-1", Utc::now()).unwrap();
        store.put(&job).await.unwrap();

        assert_eq!(store.get(job.id).await.unwrap().state, JobState::InProgress);
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let flags = MemoryAvailability::default();
        assert!(matches!(flags.try_claim("m").await, Err(StoreError::NotFound(_))));

        flags.set("m", true).await.unwrap();
        assert!(flags.try_claim("m").await.unwrap());
        assert!(!flags.try_claim("m").await.unwrap());
        assert!(!flags.get("m").await.unwrap());

        flags.remove("m").await.unwrap();
        assert!(flags.get("m").await.is_err());
    }
}
