use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use fairshare_domain::{AuditActor, ProposalFilter, ProposalState, SwapDecision};
use fairshare_engine::ProposeSwap;

use crate::{
    error::{ApiError, ApiResult},
    handlers::parse_optional,
    response::{created, success},
    routes::AppState,
};

/// 提议查询参数
#[derive(Debug, Default, Deserialize)]
pub struct SwapQueryParams {
    pub worker_id: Option<String>,
    pub state: Option<String>,
}

/// 答复请求
#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub responder: String,
    pub decision: SwapDecision,
    pub timeout_ms: Option<u64>,
}

/// 撤回请求，`actor` 形如 `worker:d-7` 或 `admin:ops`
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub actor: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestionQueryParams {
    pub limit: Option<usize>,
}

/// 发起换班
pub async fn propose_swap(
    State(state): State<AppState>,
    Json(request): Json<ProposeSwap>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let proposal = state.engine.propose_swap(request).await?;
    Ok(created(proposal))
}

/// 查询换班提议
pub async fn list_swaps(
    State(state): State<AppState>,
    Query(params): Query<SwapQueryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let filter = ProposalFilter {
        worker_id: params.worker_id.filter(|w| !w.trim().is_empty()),
        state: parse_optional::<ProposalState>(params.state.as_deref(), "state")?,
    };
    let proposals = state.engine.list_proposals(&filter).await?;
    Ok(success(proposals))
}

/// 获取单个提议
pub async fn get_swap(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let proposal = state.engine.get_proposal(id).await?;
    Ok(success(proposal))
}

/// 对方答复换班
pub async fn respond_to_swap(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RespondRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if request.responder.trim().is_empty() {
        return Err(ApiError::BadRequest("responder 不能为空".to_string()));
    }
    let proposal = state
        .engine
        .respond_to_swap(
            id,
            &request.responder,
            request.decision,
            request.timeout_ms.map(Duration::from_millis),
        )
        .await?;
    Ok(success(proposal))
}

/// 撤回换班
pub async fn cancel_swap(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let actor: AuditActor = request
        .actor
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("actor: {e}")))?;
    let proposal = state.engine.cancel_swap(id, actor).await?;
    Ok(success(proposal))
}

/// 生成系统换班推荐
pub async fn suggest_swaps(
    State(state): State<AppState>,
    Query(params): Query<SuggestionQueryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let proposals = state.engine.suggest_swaps(params.limit).await?;
    Ok(created(proposals))
}
