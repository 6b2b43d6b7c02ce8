use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::routes::AppState;

/// 存活检查，同时报告当前基线版本；尚未发布基线时为 null
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let baseline = match state.engine.context().ledger.current().await {
        Ok(current) => current.map(|a| json!({ "version": a.version, "gini": a.snapshot.gini })),
        Err(e) => {
            tracing::warn!("读取当前基线失败: {}", e);
            None
        }
    };

    Json(json!({
        "status": "ok",
        "service": "fairshare",
        "version": env!("CARGO_PKG_VERSION"),
        "baseline": baseline,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
