use hangar_core::prelude::*;
use hangar_scheduler::prelude::*;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState<S: HangarServices> {
    pub scheduler: Arc<JobScheduler<S>>,
}

impl<S: HangarServices> AppState<S> {
    pub fn new(scheduler: JobScheduler<S>) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
        }
    }

    pub fn scheduler(&self) -> &JobScheduler<S> {
        &self.scheduler
    }
}
