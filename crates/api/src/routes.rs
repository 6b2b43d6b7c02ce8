use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::mpsc;

use fairshare_domain::AvailabilityEvent;
use fairshare_engine::FairnessEngine;

use crate::handlers::{
    assignment::{get_assignment_version, get_current_assignment, get_fairness_history},
    audit::get_audit_log,
    health::health_check,
    optimization::run_optimization,
    swaps::{cancel_swap, get_swap, list_swaps, propose_swap, respond_to_swap, suggest_swaps},
    workers::{list_workers, report_availability},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub engine: FairnessEngine,
    /// 可用状态事件交给后台监听器顺序处理
    pub availability: mpsc::Sender<AvailabilityEvent>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 分配与公平度
        .route("/api/assignment/current", get(get_current_assignment))
        .route("/api/assignment/{version}", get(get_assignment_version))
        .route("/api/fairness/history", get(get_fairness_history))
        .route("/api/optimization/run", post(run_optimization))
        // 换班市场
        .route("/api/swaps", get(list_swaps).post(propose_swap))
        .route("/api/swaps/suggestions", post(suggest_swaps))
        .route("/api/swaps/{id}", get(get_swap))
        .route("/api/swaps/{id}/respond", post(respond_to_swap))
        .route("/api/swaps/{id}/cancel", post(cancel_swap))
        // Worker
        .route("/api/workers", get(list_workers))
        .route("/api/workers/{id}/availability", post(report_availability))
        // 审计
        .route("/api/audit", get(get_audit_log))
        .with_state(state)
}
