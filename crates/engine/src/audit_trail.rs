use std::sync::Arc;

use tracing::error;

use fairshare_domain::{
    AuditEntry, AuditFilter, AuditPage, AuditQuery, AuditRepository, FairshareError,
    FairshareResult,
};
use fairshare_observability::StructuredLogger;

/// 审计写入入口。写入失败一律视为持久化错误，产生它的操作随之失败。
pub struct AuditTrail {
    repository: Arc<dyn AuditRepository>,
}

impl AuditTrail {
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self { repository }
    }

    pub async fn record(&self, entry: AuditEntry) -> FairshareResult<AuditEntry> {
        let action = entry.action;
        let stored = self.repository.append(entry).await.map_err(|e| {
            error!("审计记录 {} 写入失败: {}", action.as_str(), e);
            match e {
                FairshareError::Persistence(_) => e,
                other => FairshareError::persistence(other.to_string()),
            }
        })?;
        StructuredLogger::log_audit_append(stored.sequence, action.as_str(), &stored.subject);
        Ok(stored)
    }

    pub async fn page(
        &self,
        filter: &AuditFilter,
        after: Option<u64>,
        page_size: usize,
    ) -> FairshareResult<AuditPage> {
        self.repository
            .query_page(filter, after, page_size.max(1))
            .await
    }

    pub fn query(&self, filter: AuditFilter) -> AuditQuery {
        AuditQuery::new(self.repository.clone(), filter)
    }
}
