use crate::state::AppState;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hangar_core::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Some(err) = self.0.downcast_ref::<SchedulerError>() {
            return match err {
                SchedulerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                SchedulerError::InvalidTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
                _ => match err.kind() {
                    ErrorKind::NotFound | ErrorKind::MachineDoesNotExist => {
                        (StatusCode::NOT_FOUND, err.to_string())
                    }
                    ErrorKind::Timeout | ErrorKind::InitializationFailure => {
                        (StatusCode::GATEWAY_TIMEOUT, err.to_string())
                    }
                    ErrorKind::Cancelled => (StatusCode::CONFLICT, err.to_string()),
                    ErrorKind::Fatal => {
                        error!("Internal SchedulerError: {:?}", self.0);
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "Scheduler Error".to_string(),
                        )
                    }
                },
            }
            .into_response();
        }

        error!("Internal Server Error: {:?}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_string(),
        )
            .into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub command: String,
    pub output_dir: String,
    pub machine_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectResponse {
    pub jobs: Vec<Job>,
}

/// POST /jobs
pub async fn submit_job<S: HangarServices>(
    State(state): State<AppState<S>>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .scheduler()
        .submit(req.command, req.output_dir, req.machine_name)
        .await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /jobs/{id}
pub async fn get_job<S: HangarServices>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let res = match state.scheduler().get(id).await? {
        Some(job) => Json(job).into_response(),
        None => (StatusCode::NOT_FOUND, format!("Job {id} not found")).into_response(),
    };
    Ok(res)
}

/// POST /jobs/dispatch
pub async fn dispatch<S: HangarServices>(
    State(state): State<AppState<S>>,
) -> Result<Json<DispatchReport>, ApiError> {
    Ok(Json(state.scheduler().dispatch().await?))
}

/// POST /jobs/collect
pub async fn collect<S: HangarServices>(
    State(state): State<AppState<S>>,
) -> Result<Json<CollectResponse>, ApiError> {
    let jobs = state.scheduler().collect().await?;
    Ok(Json(CollectResponse { jobs }))
}
