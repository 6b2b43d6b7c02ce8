use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fairshare_domain::{Availability, AvailabilityEvent, DomainEvent, FairshareError};

use crate::{
    error::{ApiError, ApiResult},
    response::{accepted, success},
    routes::AppState,
};

/// 健康/疲劳子系统上报的可用状态
#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub availability: Availability,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityReceipt {
    pub event_id: Uuid,
    pub worker_id: String,
    pub availability: Availability,
}

/// 获取Worker名册
pub async fn list_workers(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let workers = state.engine.context().roster.list_workers().await?;
    Ok(success(workers))
}

/// 上报Worker可用状态，由后台监听器异步应用
pub async fn report_availability(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    Json(request): Json<AvailabilityRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if state
        .engine
        .context()
        .roster
        .get_worker(&worker_id)
        .await?
        .is_none()
    {
        return Err(FairshareError::worker_not_found(worker_id).into());
    }

    let event = AvailabilityEvent::new(
        worker_id.as_str(),
        request.availability,
        request.reason,
        state.engine.context().clock.now(),
    );
    let receipt = AvailabilityReceipt {
        event_id: event.id,
        worker_id,
        availability: event.availability,
    };
    let event_type = event.event_type().to_string();
    state
        .availability
        .send(event)
        .await
        .map_err(|_| {
            ApiError::Engine(FairshareError::Internal("可用状态监听器已停止".to_string()))
        })?;
    Ok(accepted(receipt, format!("{event_type} 已受理")))
}
