//! 审计日志
//!
//! 只追加。每条记录带有单调递增的序号，查询按序号分页。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use fairshare_errors::{FairshareError, FairshareResult};

use crate::repositories::AuditRepository;

/// 产生审计事件的主体
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuditActor {
    /// 批量优化调度器
    Scheduler,
    /// 换班市场（如过期清理）
    Marketplace,
    /// 外部系统事件，如可用状态变更
    System,
    Worker(String),
    Admin(String),
}

impl AuditActor {
    pub fn worker<S: Into<String>>(id: S) -> Self {
        AuditActor::Worker(id.into())
    }

    pub fn admin<S: Into<String>>(id: S) -> Self {
        AuditActor::Admin(id.into())
    }
}

impl std::fmt::Display for AuditActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditActor::Scheduler => f.write_str("scheduler"),
            AuditActor::Marketplace => f.write_str("marketplace"),
            AuditActor::System => f.write_str("system"),
            AuditActor::Worker(id) => write!(f, "worker:{id}"),
            AuditActor::Admin(id) => write!(f, "admin:{id}"),
        }
    }
}

impl std::str::FromStr for AuditActor {
    type Err = FairshareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduler" => return Ok(AuditActor::Scheduler),
            "marketplace" => return Ok(AuditActor::Marketplace),
            "system" => return Ok(AuditActor::System),
            _ => {}
        }
        match s.split_once(':') {
            Some(("worker", id)) if !id.is_empty() => Ok(AuditActor::Worker(id.to_string())),
            Some(("admin", id)) if !id.is_empty() => Ok(AuditActor::Admin(id.to_string())),
            _ => Err(FairshareError::validation_error(format!(
                "无效的审计主体: {s}"
            ))),
        }
    }
}

impl Serialize for AuditActor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AuditActor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    BaselinePublished,
    OptimizationFailed,
    /// 放宽硬约束发布基线
    ViolationOverridden,
    SwapProposed,
    SwapAccepted,
    SwapRejected,
    SwapCancelled,
    SwapExpired,
    AvailabilityChanged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::BaselinePublished => "baseline_published",
            AuditAction::OptimizationFailed => "optimization_failed",
            AuditAction::ViolationOverridden => "violation_overridden",
            AuditAction::SwapProposed => "swap_proposed",
            AuditAction::SwapAccepted => "swap_accepted",
            AuditAction::SwapRejected => "swap_rejected",
            AuditAction::SwapCancelled => "swap_cancelled",
            AuditAction::SwapExpired => "swap_expired",
            AuditAction::AvailabilityChanged => "availability_changed",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = FairshareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s {
            "baseline_published" => AuditAction::BaselinePublished,
            "optimization_failed" => AuditAction::OptimizationFailed,
            "violation_overridden" => AuditAction::ViolationOverridden,
            "swap_proposed" => AuditAction::SwapProposed,
            "swap_accepted" => AuditAction::SwapAccepted,
            "swap_rejected" => AuditAction::SwapRejected,
            "swap_cancelled" => AuditAction::SwapCancelled,
            "swap_expired" => AuditAction::SwapExpired,
            "availability_changed" => AuditAction::AvailabilityChanged,
            _ => {
                return Err(FairshareError::validation_error(format!(
                    "无效的审计动作: {s}"
                )))
            }
        };
        Ok(action)
    }
}

/// 一次变更前后的公平性指标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FairnessDelta {
    pub gini_before: f64,
    pub gini_after: f64,
    pub variance_before: f64,
    pub variance_after: f64,
}

impl FairnessDelta {
    pub fn gini_change(&self) -> f64 {
        self.gini_after - self.gini_before
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// 追加时由仓储分配，从 1 开始
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: AuditActor,
    pub action: AuditAction,
    /// 被操作对象，如 `baseline:3`、`proposal:<uuid>`、`worker:d-1`
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fairness: Option<FairnessDelta>,
    pub reason: String,
    /// 需要人工复核
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl AuditEntry {
    pub fn new<S: Into<String>>(
        actor: AuditActor,
        action: AuditAction,
        subject: S,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sequence: 0,
            timestamp,
            actor,
            action,
            subject: subject.into(),
            fairness: None,
            reason: String::new(),
            flagged: false,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_fairness(mut self, fairness: FairnessDelta) -> Self {
        self.fairness = Some(fairness);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn flagged(mut self) -> Self {
        self.flagged = true;
        self
    }
}

pub fn baseline_subject(version: u64) -> String {
    format!("baseline:{version}")
}

pub fn proposal_subject(id: &uuid::Uuid) -> String {
    format!("proposal:{id}")
}

pub fn worker_subject(id: &str) -> String {
    format!("worker:{id}")
}

/// 审计查询条件，全部为可选
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub actor: Option<AuditActor>,
    pub action: Option<AuditAction>,
    pub subject: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(actor) = &self.actor {
            if &entry.actor != actor {
                return false;
            }
        }
        if let Some(action) = self.action {
            if entry.action != action {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if &entry.subject != subject {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// 一页审计记录；`next_cursor` 为本页最后一条的序号，没有更多记录时为 None
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub next_cursor: Option<u64>,
}

pub const DEFAULT_AUDIT_PAGE_SIZE: usize = 100;

/// 可重复执行的审计查询，每次 `stream()` 都从头按序号返回匹配记录
#[derive(Clone)]
pub struct AuditQuery {
    repository: Arc<dyn AuditRepository>,
    filter: AuditFilter,
    page_size: usize,
}

impl AuditQuery {
    pub fn new(repository: Arc<dyn AuditRepository>, filter: AuditFilter) -> Self {
        Self {
            repository,
            filter,
            page_size: DEFAULT_AUDIT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn filter(&self) -> &AuditFilter {
        &self.filter
    }

    pub async fn page(&self, after: Option<u64>) -> FairshareResult<AuditPage> {
        self.repository
            .query_page(&self.filter, after, self.page_size)
            .await
    }

    pub fn stream(&self) -> BoxStream<'static, FairshareResult<AuditEntry>> {
        let query = self.clone();
        stream::unfold(Some(None), move |cursor: Option<Option<u64>>| {
            let query = query.clone();
            async move {
                let after = cursor?;
                match query.page(after).await {
                    Ok(page) => {
                        let next = page.next_cursor.map(Some);
                        let items: Vec<FairshareResult<AuditEntry>> =
                            page.entries.into_iter().map(Ok).collect();
                        Some((stream::iter(items), next))
                    }
                    Err(e) => Some((stream::iter(vec![Err(e)]), None)),
                }
            }
        })
        .flatten()
        .boxed()
    }
}

impl std::fmt::Debug for AuditQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditQuery")
            .field("filter", &self.filter)
            .field("page_size", &self.page_size)
            .finish()
    }
}
