//! # Fairshare API
//!
//! 公平分配引擎的REST接口，基于Axum构建。
//!
//! ## API 端点
//!
//! - `GET /health` - 存活检查
//! - `GET /api/assignment/current` - 当前基线分配
//! - `GET /api/assignment/{version}` - 指定版本的基线
//! - `GET /api/fairness/history?from=&to=` - 公平度历史
//! - `POST /api/optimization/run` - 立即执行批量优化
//! - `POST /api/swaps`、`GET /api/swaps?worker_id=&state=` - 发起与查询换班
//! - `GET /api/swaps/{id}`、`POST /api/swaps/{id}/respond`、`POST /api/swaps/{id}/cancel`
//! - `POST /api/swaps/suggestions?limit=` - 系统换班推荐
//! - `GET /api/workers`、`POST /api/workers/{id}/availability` - 名册与可用状态
//! - `GET /api/audit?actor=&action=&subject=&page=&page_size=` - 审计日志分页
//!
//! 所有响应使用 `{success, data, message, timestamp}` 格式。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;

use fairshare_config::ApiConfig;

use middleware::{cors_layer, request_logging, timeout_layer, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, api_config: &ApiConfig) -> Router {
    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(timeout_layer(api_config.request_timeout_seconds))
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if api_config.cors_enabled {
        router.layer(cors_layer())
    } else {
        router
    }
}
