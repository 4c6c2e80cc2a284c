//! `PreviewPlan`/`PreviewPlanCost` (spec §4.5/§4.6/§4.7): plan generation
//! and cost estimation without submitting a job.

use axum::extract::State;
use axum::Json;
use mesh_domain::job::{Plan, ReduceSpec};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PreviewPlanRequest {
    pub session_id: String,
    pub text: String,
    #[serde(default)]
    pub max_workers: usize,
}

#[derive(Debug, Serialize)]
pub struct PreviewPlanResponse {
    pub used_ai: bool,
    pub notes: String,
    pub rationale: String,
    pub plan: Plan,
    pub reduce: ReduceSpec,
}

pub async fn preview_plan(
    State(state): State<AppState>,
    Json(req): Json<PreviewPlanRequest>,
) -> ApiResult<Json<PreviewPlanResponse>> {
    state.sessions.resolve(&req.session_id)?;

    let devices = state.registry.list();
    let outcome = mesh_planner::plan(&req.text, &devices, Some(state.llm.as_ref()), req.max_workers).await;

    Ok(Json(PreviewPlanResponse {
        used_ai: outcome.used_ai,
        notes: outcome.notes,
        rationale: outcome.rationale,
        plan: outcome.plan,
        reduce: outcome.reduce,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PreviewPlanCostRequest {
    pub session_id: String,
    pub plan: Plan,
    #[serde(default)]
    pub device_ids: Vec<String>,
}

pub async fn preview_plan_cost(
    State(state): State<AppState>,
    Json(req): Json<PreviewPlanCostRequest>,
) -> ApiResult<Json<mesh_cost::PlanCostReport>> {
    state.sessions.resolve(&req.session_id)?;

    let mut devices = state.registry.list();
    if !req.device_ids.is_empty() {
        devices.retain(|d| req.device_ids.contains(&d.id));
    }

    let report = mesh_cost::estimate_plan_cost(&req.plan, &devices);
    Ok(Json(report))
}
