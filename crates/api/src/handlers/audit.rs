use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use fairshare_domain::{AuditAction, AuditActor, AuditFilter};

use crate::{
    error::{ApiError, ApiResult},
    handlers::parse_optional,
    response::success,
    routes::AppState,
};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;

/// 审计查询参数。`page` 为上一页返回的 `next_cursor`
#[derive(Debug, Default, Deserialize)]
pub struct AuditQueryParams {
    pub actor: Option<String>,
    pub action: Option<String>,
    pub subject: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    #[serde(alias = "after")]
    pub page: Option<u64>,
    pub page_size: Option<usize>,
}

/// 分页查询审计日志
pub async fn get_audit_log(
    State(state): State<AppState>,
    Query(params): Query<AuditQueryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "page_size 必须在 1 到 {MAX_PAGE_SIZE} 之间"
        )));
    }
    let filter = AuditFilter {
        actor: parse_optional::<AuditActor>(params.actor.as_deref(), "actor")?,
        action: parse_optional::<AuditAction>(params.action.as_deref(), "action")?,
        subject: params.subject.filter(|s| !s.trim().is_empty()),
        from: params.from,
        until: params.until,
    };
    let page = state
        .engine
        .get_audit_log(&filter, params.page, page_size)
        .await?;
    Ok(success(page))
}
