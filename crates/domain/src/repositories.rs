//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use fairshare_errors::FairshareResult;

use crate::assignment::Assignment;
use crate::audit::{AuditEntry, AuditFilter, AuditPage};
use crate::constraint::Constraint;
use crate::entities::{Availability, WorkItem, Worker};
use crate::proposal::{ProposalFilter, ProposalState, SwapProposal};

/// 基线分配仓储，版本只追加
#[async_trait]
pub trait BaselineRepository: Send + Sync {
    /// 追加新版本，版本号必须是当前最新版本 + 1，否则返回 Conflict
    async fn append(&self, assignment: Assignment) -> FairshareResult<Arc<Assignment>>;
    async fn current(&self) -> FairshareResult<Option<Arc<Assignment>>>;
    async fn get(&self, version: u64) -> FairshareResult<Option<Arc<Assignment>>>;
    /// 按时间范围返回所有版本，按版本号升序
    async fn history(
        &self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> FairshareResult<Vec<Arc<Assignment>>>;
}

/// Worker、工作项与约束集
#[async_trait]
pub trait RosterRepository: Send + Sync {
    async fn upsert_worker(&self, worker: &Worker) -> FairshareResult<Worker>;
    async fn get_worker(&self, id: &str) -> FairshareResult<Option<Worker>>;
    /// 按ID升序
    async fn list_workers(&self) -> FairshareResult<Vec<Worker>>;
    /// 返回更新后的Worker；Worker不存在时返回 WorkerNotFound
    async fn set_availability(
        &self,
        id: &str,
        availability: Availability,
    ) -> FairshareResult<Worker>;
    async fn replace_work_items(&self, items: Vec<WorkItem>) -> FairshareResult<()>;
    /// 按ID升序
    async fn list_work_items(&self) -> FairshareResult<Vec<WorkItem>>;
    async fn get_work_item(&self, id: &str) -> FairshareResult<Option<WorkItem>>;
    async fn set_constraints(&self, constraints: Vec<Constraint>) -> FairshareResult<()>;
    async fn list_constraints(&self) -> FairshareResult<Vec<Constraint>>;
}

/// 换班提议仓储
#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn insert(&self, proposal: &SwapProposal) -> FairshareResult<()>;
    async fn get(&self, id: Uuid) -> FairshareResult<Option<SwapProposal>>;
    /// 仅当存储中的状态等于 `expected` 时写入，返回是否写入成功
    async fn compare_and_update(
        &self,
        expected: ProposalState,
        proposal: &SwapProposal,
    ) -> FairshareResult<bool>;
    /// 按创建时间升序
    async fn list(&self, filter: &ProposalFilter) -> FairshareResult<Vec<SwapProposal>>;
}

/// 审计日志仓储，只追加
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// 分配序号并持久化，返回带序号的记录
    async fn append(&self, entry: AuditEntry) -> FairshareResult<AuditEntry>;
    /// 返回序号大于 `after` 的匹配记录，最多 `limit` 条
    async fn query_page(
        &self,
        filter: &AuditFilter,
        after: Option<u64>,
        limit: usize,
    ) -> FairshareResult<AuditPage>;
}
