use hangar_core::prelude::*;
use tracing::debug;

/// Bookkeeping of the "free to accept a new job" flag, keyed by machine name.
///
/// The flag lives outside the machine itself so that a machine can be
/// powered on and initialized while still being reserved by a job.
#[derive(Clone, Debug)]
pub struct MachineRegistry<A> {
    store: A,
}

impl<A: AvailabilityStore> MachineRegistry<A> {
    pub fn new(store: A) -> Self {
        Self { store }
    }

    pub async fn set_available(&self, name: &str, available: bool) -> Result<(), StoreError> {
        debug!("Marking machine {name} available={available}");
        self.store.set(name, available).await
    }

    /// Fails with [`StoreError::NotFound`] if the machine was never registered.
    pub async fn is_available(&self, name: &str) -> Result<bool, StoreError> {
        self.store.get(name).await
    }

    /// Takes the machine for a job. Returns `false` if someone else holds it.
    pub async fn claim(&self, name: &str) -> Result<bool, StoreError> {
        let claimed = self.store.try_claim(name).await?;
        debug!("Claim of machine {name}: {claimed}");
        Ok(claimed)
    }

    pub async fn release(&self, name: &str) -> Result<(), StoreError> {
        self.set_available(name, true).await
    }

    /// Drops the record of a machine that no longer exists.
    pub async fn forget(&self, name: &str) -> Result<(), StoreError> {
        debug!("Forgetting availability of machine {name}");
        self.store.remove(name).await
    }
}
