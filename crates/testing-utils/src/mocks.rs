//! Mock implementations for failure injection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use mockall::mock;

use fairshare_domain::{AuditAction, AuditEntry, AuditFilter, AuditPage, AuditRepository};
use fairshare_errors::{FairshareError, FairshareResult};
use fairshare_observability::{Alert, AlertChannel};

mock! {
    pub AuditStore {}

    #[async_trait]
    impl AuditRepository for AuditStore {
        async fn append(&self, entry: AuditEntry) -> FairshareResult<AuditEntry>;
        async fn query_page(
            &self,
            filter: &AuditFilter,
            after: Option<u64>,
            limit: usize,
        ) -> FairshareResult<AuditPage>;
    }
}

/// 所有写入都失败的审计仓储
pub fn failing_audit_store() -> MockAuditStore {
    let mut store = MockAuditStore::new();
    store
        .expect_append()
        .returning(|_| Err(FairshareError::persistence("磁盘已满")));
    store
        .expect_query_page()
        .returning(|_, _, _| Ok(AuditPage::default()));
    store
}

/// 包装一个真实仓储，可在场景中途切换为写入失败
pub struct SwitchableAuditRepository {
    inner: Arc<dyn AuditRepository>,
    failing: AtomicBool,
    failing_action: RwLock<Option<AuditAction>>,
}

impl SwitchableAuditRepository {
    pub fn new(inner: Arc<dyn AuditRepository>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            failing_action: RwLock::new(None),
        }
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 只让指定动作的写入失败
    pub fn fail_action(&self, action: Option<AuditAction>) {
        *self.failing_action.write().unwrap_or_else(|e| e.into_inner()) = action;
    }
}

#[async_trait]
impl AuditRepository for SwitchableAuditRepository {
    async fn append(&self, entry: AuditEntry) -> FairshareResult<AuditEntry> {
        let action_fails = *self.failing_action.read().unwrap_or_else(|e| e.into_inner())
            == Some(entry.action);
        if self.failing.load(Ordering::SeqCst) || action_fails {
            return Err(FairshareError::persistence("审计存储不可用"));
        }
        self.inner.append(entry).await
    }

    async fn query_page(
        &self,
        filter: &AuditFilter,
        after: Option<u64>,
        limit: usize,
    ) -> FairshareResult<AuditPage> {
        self.inner.query_page(filter, after, limit).await
    }
}

/// 记录收到的告警
#[derive(Debug, Default)]
pub struct RecordingAlertChannel {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AlertChannel for RecordingAlertChannel {
    fn send_alert(&self, alert: Alert) -> anyhow::Result<()> {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(alert);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fairshare_domain::{AuditAction, AuditActor};
    use fairshare_observability::AlertSeverity;

    #[tokio::test]
    async fn test_failing_audit_store() {
        let store = failing_audit_store();
        let entry = AuditEntry::new(AuditActor::Scheduler, AuditAction::BaselinePublished, "baseline:1", Utc::now());
        assert!(matches!(
            store.append(entry).await,
            Err(FairshareError::Persistence(_))
        ));
    }

    #[test]
    fn test_recording_alert_channel() {
        let channel = RecordingAlertChannel::new();
        channel
            .send_alert(Alert::new("optimization_failed", AlertSeverity::Error, "capacity"))
            .unwrap();
        assert_eq!(channel.alerts().len(), 1);
    }
}
