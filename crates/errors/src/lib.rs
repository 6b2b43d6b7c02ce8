use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 导致无可行解的约束
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingConstraint {
    /// 约束名称
    pub name: String,
    /// 约束类型: capacity / eligibility / difficulty-band / regional / availability
    pub kind: String,
    /// 说明
    pub detail: String,
}

impl BindingConstraint {
    pub fn new<N, K, D>(name: N, kind: K, detail: D) -> Self
    where
        N: Into<String>,
        K: Into<String>,
        D: Into<String>,
    {
        Self {
            name: name.into(),
            kind: kind.into(),
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for BindingConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}): {}", self.name, self.kind, self.detail)
    }
}

fn join_binding(binding: &[BindingConstraint]) -> String {
    binding
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error, Clone)]
pub enum FairshareError {
    #[error("不存在满足全部硬约束的分配方案: {}", join_binding(.binding))]
    Infeasible { binding: Vec<BindingConstraint> },
    #[error("并发冲突: {0}")]
    Conflict(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("审计记录持久化失败: {0}")]
    Persistence(String),
    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },
    #[error("工作项未找到: {id}")]
    WorkItemNotFound { id: String },
    #[error("换班提议未找到: {id}")]
    ProposalNotFound { id: String },
    #[error("换班提议 {id} 无法从 {from} 转换到 {to}")]
    InvalidTransition { id: String, from: String, to: String },
    #[error("尚未发布任何基线分配")]
    NoBaseline,
    #[error("权限不足: {0}")]
    Permission(String),
    #[error("数据验证失败: {0}")]
    ValidationError(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type FairshareResult<T> = Result<T, FairshareError>;

impl FairshareError {
    pub fn infeasible(binding: Vec<BindingConstraint>) -> Self {
        Self::Infeasible { binding }
    }
    pub fn worker_not_found<S: Into<String>>(id: S) -> Self {
        Self::WorkerNotFound { id: id.into() }
    }
    pub fn work_item_not_found<S: Into<String>>(id: S) -> Self {
        Self::WorkItemNotFound { id: id.into() }
    }
    pub fn proposal_not_found<S: Into<String>>(id: S) -> Self {
        Self::ProposalNotFound { id: id.into() }
    }
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 无可行解时返回导致失败的约束
    pub fn binding_constraints(&self) -> Option<&[BindingConstraint]> {
        match self {
            FairshareError::Infeasible { binding } => Some(binding),
            _ => None,
        }
    }

    /// 预期内的业务结果，而非系统故障
    pub fn is_business_outcome(&self) -> bool {
        matches!(self, FairshareError::Infeasible { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FairshareError::Persistence(_)
                | FairshareError::Timeout(_)
                | FairshareError::Internal(_)
                | FairshareError::Configuration(_)
        )
    }

    /// 调用方刷新状态后可重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, FairshareError::Conflict(_))
    }

    pub fn user_message(&self) -> &str {
        match self {
            FairshareError::Infeasible { .. } => "当前运力或资质无法覆盖全部路线，请调整输入后重试",
            FairshareError::Conflict(_) => "路线已不可用，请刷新后重试",
            FairshareError::Timeout(_) => "操作超时，状态未发生变化",
            FairshareError::WorkerNotFound { .. } => "请求的司机不存在",
            FairshareError::WorkItemNotFound { .. } => "请求的路线不存在",
            FairshareError::ProposalNotFound { .. } => "请求的换班提议不存在",
            FairshareError::InvalidTransition { .. } => "换班提议已结束，无法再次处理",
            FairshareError::NoBaseline => "尚未生成分配基线",
            FairshareError::Permission(_) => "您没有执行此操作的权限",
            FairshareError::ValidationError(_) => "输入数据验证失败",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for FairshareError {
    fn from(err: serde_json::Error) -> Self {
        FairshareError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for FairshareError {
    fn from(err: anyhow::Error) -> Self {
        FairshareError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for FairshareError {
    fn from(err: sqlx::Error) -> Self {
        FairshareError::Persistence(err.to_string())
    }
}
