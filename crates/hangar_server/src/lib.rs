//! # Hangar Server
//!
//! An Axum router exposing a [`JobScheduler`](hangar_scheduler::scheduler::JobScheduler) over HTTP.
//!
//! | Route | Operation |
//! |---|---|
//! | `POST /jobs` | submit `{command, output_dir, machine_name}` |
//! | `GET /jobs/{id}` | look a job up |
//! | `POST /jobs/dispatch` | run one dispatch pass |
//! | `POST /jobs/collect` | run one collect pass |
//! | `GET /health` | liveness |
//!
//! Dispatch and collect are meant to be triggered periodically, e.g. by a
//! cron rule or by `hangar worker`.
//!
//! ## Example
//!
//! ```no_run
//! use hangar_core::prelude::*;
//! use hangar_memory::*;
//! use hangar_scheduler::prelude::*;
//! use hangar_server::HangarServer;
//!
//! # async fn run() {
//! let services = CoreServices {
//!     jobs: MemoryJobStore::default(),
//!     queue: MemoryQueue::with_queues([queues::WAITING, queues::RUNNING]),
//!     machines: SimulatedMachines::default(),
//!     availability: MemoryAvailability::default(),
//!     notifier: NoNotifier,
//! };
//! let scheduler = JobScheduler::new(services, SchedulerConfig::default());
//! let app = HangarServer.build(scheduler);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! # }
//! ```

mod api;

pub mod state;

use hangar_core::prelude::{routes::*, *};
use hangar_scheduler::prelude::*;

use axum::{
    Router,
    routing::{get, post},
};
use state::AppState;
use tower_http::trace::TraceLayer;

pub use api::{CollectResponse, SubmitJobRequest};

/// The builder for the Hangar Server.
#[derive(Clone, Copy, Debug, Default)]
pub struct HangarServer;

impl HangarServer {
    pub fn build<S: HangarServices>(self, scheduler: JobScheduler<S>) -> Router {
        Router::new()
            .route(HEALTH, get(|| async { "OK" }))
            .route(JOBS, post(api::submit_job))
            .route(JOBS_DISPATCH, post(api::dispatch))
            .route(JOBS_COLLECT, post(api::collect))
            .route(JOBS_BY_ID, get(api::get_job))
            .layer(TraceLayer::new_for_http())
            .with_state(AppState::new(scheduler))
    }
}

pub mod prelude {
    pub use crate::state::*;
    pub use crate::{CollectResponse, HangarServer, SubmitJobRequest};
}
