use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use fairshare_domain::{Assignment, BaselineRepository};
use fairshare_errors::{FairshareError, FairshareResult};

/// 内存基线仓储，版本按追加顺序保存
#[derive(Debug, Default)]
pub struct InMemoryBaselineRepository {
    versions: RwLock<Vec<Arc<Assignment>>>,
}

impl InMemoryBaselineRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.versions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.versions.read().await.is_empty()
    }
}

#[async_trait]
impl BaselineRepository for InMemoryBaselineRepository {
    async fn append(&self, assignment: Assignment) -> FairshareResult<Arc<Assignment>> {
        let mut versions = self.versions.write().await;
        let expected = versions.last().map_or(1, |latest| latest.version + 1);
        if assignment.version != expected {
            return Err(FairshareError::conflict(format!(
                "基线版本应为 {}，实际为 {}",
                expected, assignment.version
            )));
        }
        let assignment = Arc::new(assignment);
        versions.push(assignment.clone());
        debug!("追加基线版本 {}", assignment.version);
        Ok(assignment)
    }

    async fn current(&self) -> FairshareResult<Option<Arc<Assignment>>> {
        Ok(self.versions.read().await.last().cloned())
    }

    async fn get(&self, version: u64) -> FairshareResult<Option<Arc<Assignment>>> {
        let versions = self.versions.read().await;
        Ok(version
            .checked_sub(1)
            .and_then(|index| versions.get(index as usize))
            .cloned())
    }

    async fn history(
        &self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> FairshareResult<Vec<Arc<Assignment>>> {
        Ok(self
            .versions
            .read()
            .await
            .iter()
            .filter(|a| from.map_or(true, |from| a.created_at >= from))
            .filter(|a| until.map_or(true, |until| a.created_at <= until))
            .cloned()
            .collect())
    }
}
