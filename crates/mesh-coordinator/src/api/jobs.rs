//! `SubmitJob`/`GetJob` (spec §4.4/§4.7).

use axum::extract::{Path, State};
use axum::Json;
use mesh_domain::job::{Plan, ReduceSpec};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub session_id: String,
    pub text: String,
    #[serde(default)]
    pub max_workers: usize,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub reduce: Option<ReduceSpec>,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub summary: String,
}

pub async fn submit_job(
    State(state): State<AppState>,
    Json(req): Json<SubmitJobRequest>,
) -> ApiResult<Json<SubmitJobResponse>> {
    state.sessions.resolve(&req.session_id)?;

    let summary = state
        .jobs
        .submit_job(
            &req.text,
            req.max_workers,
            req.plan,
            req.reduce,
            Some(state.llm.as_ref()),
        )
        .await?;

    Ok(Json(SubmitJobResponse {
        job_id: summary.job_id,
        created_at: summary.created_at,
        summary: summary.summary,
    }))
}

#[derive(Debug, Serialize)]
pub struct GetJobResponse {
    pub state: mesh_domain::job::JobState,
    pub tasks: Vec<mesh_domain::job::Task>,
    pub final_result: String,
    pub current_group: usize,
    pub total_groups: usize,
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<GetJobResponse>> {
    let view = state.jobs.get_job(&job_id).await?;
    Ok(Json(GetJobResponse {
        state: view.state,
        tasks: view.tasks,
        final_result: view.final_result,
        current_group: view.current_group,
        total_groups: view.total_groups,
    }))
}
