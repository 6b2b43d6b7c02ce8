use async_trait::async_trait;
use tokio::sync::RwLock;

use fairshare_domain::{AuditEntry, AuditFilter, AuditPage, AuditRepository};
use fairshare_errors::FairshareResult;

/// 进程内审计日志，序号从 1 开始连续分配
#[derive(Debug, Default)]
pub struct InMemoryAuditRepository {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// 全部记录，测试与调试用
    pub async fn snapshot(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append(&self, mut entry: AuditEntry) -> FairshareResult<AuditEntry> {
        let mut entries = self.entries.write().await;
        entry.sequence = entries.len() as u64 + 1;
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn query_page(
        &self,
        filter: &AuditFilter,
        after: Option<u64>,
        limit: usize,
    ) -> FairshareResult<AuditPage> {
        let entries = self.entries.read().await;
        let start = after.unwrap_or(0) as usize;
        let matching = entries
            .iter()
            .skip(start)
            .filter(|e| filter.matches(e))
            .cloned();
        Ok(page_of(matching, limit))
    }
}

/// 取前 `limit` 条；后面还有记录时返回本页最后一条的序号作为游标
pub(crate) fn page_of<I>(matching: I, limit: usize) -> AuditPage
where
    I: Iterator<Item = AuditEntry>,
{
    let limit = limit.max(1);
    let mut entries: Vec<AuditEntry> = matching.take(limit + 1).collect();
    let has_more = entries.len() > limit;
    entries.truncate(limit);
    let next_cursor = if has_more {
        entries.last().map(|e| e.sequence)
    } else {
        None
    };
    AuditPage {
        entries,
        next_cursor,
    }
}
