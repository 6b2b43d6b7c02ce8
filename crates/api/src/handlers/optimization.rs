use std::time::Duration;

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fairshare_engine::OptimizationReport;

use crate::{error::ApiResult, response::success, routes::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct RunQueryParams {
    /// 不提供时使用调度配置中的超时
    pub timeout_ms: Option<u64>,
}

/// 一次批量优化的结果摘要
#[derive(Debug, Serialize)]
pub struct OptimizationRunResponse {
    pub version: u64,
    pub gini_before: Option<f64>,
    pub gini_after: f64,
    pub variance: f64,
    pub round_robin_gini: f64,
    pub churn: usize,
    pub capacity_override: bool,
    pub invalidated_proposals: Vec<Uuid>,
    pub duration_ms: u64,
}

impl From<OptimizationReport> for OptimizationRunResponse {
    fn from(report: OptimizationReport) -> Self {
        Self {
            version: report.assignment.version,
            gini_before: report.gini_before,
            gini_after: report.assignment.snapshot.gini,
            variance: report.assignment.snapshot.variance,
            round_robin_gini: report.round_robin_gini,
            churn: report.churn,
            capacity_override: report.capacity_override,
            invalidated_proposals: report.invalidated_proposals,
            duration_ms: report.duration_ms,
        }
    }
}

/// 立即执行批量优化
pub async fn run_optimization(
    State(state): State<AppState>,
    Query(params): Query<RunQueryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let report = state
        .engine
        .run_optimization_now(params.timeout_ms.map(Duration::from_millis))
        .await?;
    Ok(success(OptimizationRunResponse::from(report)))
}
