use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fairshare_errors::FairshareError;
use serde_json::json;

use crate::response::ApiResponse;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Engine(#[from] FairshareError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(err) => match err {
                FairshareError::Infeasible { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                FairshareError::Conflict(_) | FairshareError::InvalidTransition { .. } => {
                    StatusCode::CONFLICT
                }
                FairshareError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                FairshareError::WorkerNotFound { .. }
                | FairshareError::WorkItemNotFound { .. }
                | FairshareError::ProposalNotFound { .. }
                | FairshareError::NoBaseline => StatusCode::NOT_FOUND,
                FairshareError::Permission(_) => StatusCode::FORBIDDEN,
                FairshareError::ValidationError(_) | FairshareError::Serialization(_) => {
                    StatusCode::BAD_REQUEST
                }
                FairshareError::Persistence(_)
                | FairshareError::Configuration(_)
                | FairshareError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::Engine(err) => match err {
                FairshareError::Infeasible { .. } => "INFEASIBLE",
                FairshareError::Conflict(_) => "CONFLICT",
                FairshareError::Timeout(_) => "TIMEOUT",
                FairshareError::Persistence(_) => "PERSISTENCE_ERROR",
                FairshareError::WorkerNotFound { .. } => "WORKER_NOT_FOUND",
                FairshareError::WorkItemNotFound { .. } => "WORK_ITEM_NOT_FOUND",
                FairshareError::ProposalNotFound { .. } => "PROPOSAL_NOT_FOUND",
                FairshareError::InvalidTransition { .. } => "INVALID_TRANSITION",
                FairshareError::NoBaseline => "NO_BASELINE",
                FairshareError::Permission(_) => "FORBIDDEN",
                FairshareError::ValidationError(_) => "VALIDATION_ERROR",
                FairshareError::Serialization(_) => "SERIALIZATION_ERROR",
                FairshareError::Configuration(_) | FairshareError::Internal(_) => "INTERNAL_ERROR",
            },
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound => "NOT_FOUND",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("请求处理失败: {}", self);
        }

        let (binding, hint) = match &self {
            ApiError::Engine(err) => (
                err.binding_constraints().map(|b| b.to_vec()),
                Some(err.user_message()),
            ),
            _ => (None, None),
        };
        let data = json!({
            "type": self.error_type(),
            "code": status.as_u16(),
            "binding": binding,
            "hint": hint,
        });
        // 内部错误不向调用方暴露细节
        let message = match &self {
            ApiError::Engine(FairshareError::Configuration(_))
            | ApiError::Engine(FairshareError::Internal(_)) => "系统内部错误".to_string(),
            other => other.to_string(),
        };

        (status, ApiResponse::failure(Some(data), message)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
