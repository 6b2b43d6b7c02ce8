//! 基线账本
//!
//! 基线是只追加的版本序列，“当前基线”即最新版本。所有改变基线或提议状态的操作
//! 都必须先拿到提交锁，整个系统同一时刻只有一个写者。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use fairshare_domain::{
    Assignment, BaselineRepository, FairnessHistoryPoint, FairshareError, FairshareResult,
};

/// 持有提交锁的凭证
pub type CommitGuard = OwnedMutexGuard<()>;

pub struct BaselineLedger {
    repository: Arc<dyn BaselineRepository>,
    commit_lock: Arc<Mutex<()>>,
}

impl BaselineLedger {
    pub fn new(repository: Arc<dyn BaselineRepository>) -> Self {
        Self {
            repository,
            commit_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn lock(&self) -> CommitGuard {
        self.commit_lock.clone().lock_owned().await
    }

    /// 在给定时间内拿到提交锁，否则返回超时
    pub async fn lock_within(&self, timeout: Duration) -> FairshareResult<CommitGuard> {
        tokio::time::timeout(timeout, self.lock())
            .await
            .map_err(|_| {
                FairshareError::timeout(format!("等待基线提交锁超过 {}ms", timeout.as_millis()))
            })
    }

    pub async fn current(&self) -> FairshareResult<Option<Arc<Assignment>>> {
        self.repository.current().await
    }

    pub async fn require_current(&self) -> FairshareResult<Arc<Assignment>> {
        self.current().await?.ok_or(FairshareError::NoBaseline)
    }

    pub async fn get(&self, version: u64) -> FairshareResult<Option<Arc<Assignment>>> {
        self.repository.get(version).await
    }

    /// 发布新版本，调用方必须持有提交锁
    pub async fn publish(
        &self,
        _guard: &CommitGuard,
        assignment: Assignment,
    ) -> FairshareResult<Arc<Assignment>> {
        let version = assignment.version;
        let published = self.repository.append(assignment).await?;
        debug!("基线版本 {} 已发布", version);
        Ok(published)
    }

    pub async fn history(
        &self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> FairshareResult<Vec<FairnessHistoryPoint>> {
        Ok(self
            .repository
            .history(from, until)
            .await?
            .iter()
            .map(|assignment| assignment.history_point())
            .collect())
    }
}
