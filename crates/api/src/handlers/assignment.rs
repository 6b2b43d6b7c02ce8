use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

/// 公平度历史查询参数，RFC 3339 时间
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQueryParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// 获取当前基线分配
pub async fn get_current_assignment(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let assignment = state.engine.get_current_assignment().await?;
    Ok(success(assignment.as_ref().clone()))
}

/// 获取指定版本的基线分配
pub async fn get_assignment_version(
    State(state): State<AppState>,
    Path(version): Path<u64>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let assignment = state
        .engine
        .get_assignment(version)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(success(assignment.as_ref().clone()))
}

/// 按时间范围获取公平度历史
pub async fn get_fairness_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQueryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if let (Some(from), Some(to)) = (params.from, params.to) {
        if from > to {
            return Err(ApiError::BadRequest("from 不能晚于 to".to_string()));
        }
    }
    let history = state
        .engine
        .get_fairness_history(params.from, params.to)
        .await?;
    Ok(success(history))
}
