//! 可用状态监听
//!
//! 消费健康/疲劳子系统推送的 [`AvailabilityEvent`]。Worker被暂停后，
//! 其所有未决换班提议以 `worker_suspended` 拒绝。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fairshare_domain::{
    worker_subject, AuditAction, AuditActor, AuditEntry, AvailabilityEvent, DomainEvent,
    FairshareError, FairshareResult, Worker,
};
use fairshare_observability::StructuredLogger;

use crate::context::EngineContext;
use crate::marketplace::SwapMarketplace;

const RECEIVE_POLL: Duration = Duration::from_millis(500);

/// 一次状态变更的结果
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityOutcome {
    pub worker: Worker,
    pub changed: bool,
    pub rejected_proposals: Vec<Uuid>,
}

pub struct AvailabilityListener {
    ctx: EngineContext,
    marketplace: Arc<SwapMarketplace>,
    running: Arc<tokio::sync::RwLock<bool>>,
}

impl AvailabilityListener {
    pub fn new(ctx: EngineContext, marketplace: Arc<SwapMarketplace>) -> Self {
        Self {
            ctx,
            marketplace,
            running: Arc::new(tokio::sync::RwLock::new(false)),
        }
    }

    /// 持续消费事件，直到通道关闭或收到停止信号
    pub async fn listen(&self, mut events: mpsc::Receiver<AvailabilityEvent>) -> FairshareResult<()> {
        {
            let mut running = self.running.write().await;
            *running = true;
        }
        info!("启动可用状态监听");

        loop {
            if !*self.running.read().await {
                info!("收到停止信号，退出可用状态监听");
                break;
            }

            match tokio::time::timeout(RECEIVE_POLL, events.recv()).await {
                Ok(Some(event)) => {
                    if let Err(e) = self.apply(&event).await {
                        match e {
                            FairshareError::WorkerNotFound { .. } => {
                                warn!("收到未知 Worker {} 的可用状态事件", event.worker_id)
                            }
                            other => error!(
                                "处理事件 {} ({}) 失败: {}",
                                event.event_id(),
                                event.event_type(),
                                other
                            ),
                        }
                    }
                }
                Ok(None) => {
                    info!("可用状态事件通道已关闭");
                    break;
                }
                Err(_) => continue,
            }
        }

        let mut running = self.running.write().await;
        *running = false;
        Ok(())
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("可用状态监听停止信号已发送");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// 应用一次状态变更。状态未变化时不写审计。
    pub async fn apply(&self, event: &AvailabilityEvent) -> FairshareResult<AvailabilityOutcome> {
        let guard = self.ctx.ledger.lock().await;
        let current = self
            .ctx
            .roster
            .get_worker(&event.worker_id)
            .await?
            .ok_or_else(|| FairshareError::worker_not_found(event.worker_id.as_str()))?;

        if current.availability == event.availability {
            debug!(
                "Worker {} 已处于 {} 状态，忽略事件 {}",
                current.id, current.availability, event.id
            );
            return Ok(AvailabilityOutcome {
                worker: current,
                changed: false,
                rejected_proposals: Vec::new(),
            });
        }

        let now = self.ctx.clock.now();
        let mut entry = AuditEntry::new(
            AuditActor::System,
            AuditAction::AvailabilityChanged,
            worker_subject(&current.id),
            now,
        )
        .with_details(json!({
            "event_id": event.id,
            "from": current.availability,
            "to": event.availability,
            "occurred_at": event.occurred_at,
        }));
        if !event.reason.is_empty() {
            entry = entry.with_reason(event.reason.clone());
        }
        self.ctx.audit.record(entry).await?;

        let worker = self
            .ctx
            .roster
            .set_availability(&event.worker_id, event.availability)
            .await?;
        let rejected_proposals = if worker.is_suspended() {
            self.marketplace
                .reject_pending_for_worker(&guard, &worker.id)
                .await?
        } else {
            Vec::new()
        };

        StructuredLogger::log_availability_changed(
            &worker.id,
            worker.availability.as_str(),
            rejected_proposals.len(),
        );
        Ok(AvailabilityOutcome {
            worker,
            changed: true,
            rejected_proposals,
        })
    }
}
