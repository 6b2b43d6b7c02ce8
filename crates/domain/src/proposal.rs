//! 换班提议及其状态机
//!
//! `pending -> {accepted, rejected, cancelled, expired}`，终态只能进入一次，之后不可变。

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fairshare_errors::{FairshareError, FairshareResult};

use crate::value_objects::ItemMove;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    Pending,
    Accepted,
    Rejected,
    Expired,
    Cancelled,
}

impl ProposalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalState::Pending => "pending",
            ProposalState::Accepted => "accepted",
            ProposalState::Rejected => "rejected",
            ProposalState::Expired => "expired",
            ProposalState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalState::Pending)
    }
}

impl std::fmt::Display for ProposalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProposalState {
    type Err = FairshareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ProposalState::Pending),
            "accepted" => Ok(ProposalState::Accepted),
            "rejected" => Ok(ProposalState::Rejected),
            "expired" => Ok(ProposalState::Expired),
            "cancelled" => Ok(ProposalState::Cancelled),
            _ => Err(FairshareError::validation_error(format!(
                "无效的提议状态: {s}"
            ))),
        }
    }
}

/// 提议来源：司机发起或系统推荐
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalOrigin {
    #[default]
    Worker,
    System,
}

/// 对方的答复
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDecision {
    Accept,
    Reject,
}

/// 提议被拒绝的具体原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RejectionReason {
    /// 对方拒绝
    CounterpartyDeclined,
    /// 任一方处于暂停状态
    WorkerSuspended { worker_id: String },
    /// 换班后会违反硬约束
    ConstraintViolation {
        constraint: String,
        kind: String,
        detail: String,
    },
    /// 换班后Gini系数超出基线容差
    FairnessToleranceExceeded {
        baseline_gini: f64,
        proposed_gini: f64,
        limit: f64,
    },
    /// 新的批量优化基线已发布
    BaselineSuperseded { version: u64 },
}

impl RejectionReason {
    /// 指标与日志使用的短标签
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::CounterpartyDeclined => "counterparty_declined",
            RejectionReason::WorkerSuspended { .. } => "worker_suspended",
            RejectionReason::ConstraintViolation { .. } => "constraint_violation",
            RejectionReason::FairnessToleranceExceeded { .. } => "fairness_tolerance_exceeded",
            RejectionReason::BaselineSuperseded { .. } => "baseline_superseded",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::CounterpartyDeclined => write!(f, "对方拒绝了换班"),
            RejectionReason::WorkerSuspended { worker_id } => {
                write!(f, "Worker {worker_id} 处于暂停状态")
            }
            RejectionReason::ConstraintViolation {
                constraint,
                kind,
                detail,
            } => write!(f, "违反硬约束 {constraint}({kind}): {detail}"),
            RejectionReason::FairnessToleranceExceeded {
                baseline_gini,
                proposed_gini,
                limit,
            } => write!(
                f,
                "换班后Gini系数 {proposed_gini:.4} 超出上限 {limit:.4} (基线 {baseline_gini:.4})"
            ),
            RejectionReason::BaselineSuperseded { version } => {
                write!(f, "基线已被版本 {version} 取代")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapProposal {
    pub id: Uuid,
    pub from_worker: String,
    pub to_worker: String,
    /// from_worker 交出的工作项
    pub from_items: Vec<String>,
    /// to_worker 交出的工作项
    pub to_items: Vec<String>,
    /// 兼容度 0-1，仅供参考，不影响接受判定
    pub compatibility: f64,
    pub reason: String,
    pub origin: ProposalOrigin,
    pub state: ProposalState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionReason>,
    /// 提议创建时的基线版本
    pub baseline_version: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

impl SwapProposal {
    pub fn is_pending(&self) -> bool {
        matches!(self.state, ProposalState::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// 仍为 pending 但已到期
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && now >= self.expires_at
    }

    pub fn involves_worker(&self, worker_id: &str) -> bool {
        self.from_worker == worker_id || self.to_worker == worker_id
    }

    pub fn item_ids(&self) -> impl Iterator<Item = &str> {
        self.from_items
            .iter()
            .chain(self.to_items.iter())
            .map(String::as_str)
    }

    pub fn overlaps(&self, other: &SwapProposal) -> bool {
        let mine: BTreeSet<&str> = self.item_ids().collect();
        other.item_ids().any(|item| mine.contains(item))
    }

    /// 换班对应的工作项归属变化
    pub fn moves(&self) -> Vec<ItemMove> {
        let outgoing = self
            .from_items
            .iter()
            .map(|item| ItemMove::new(item, &self.from_worker, &self.to_worker));
        let incoming = self
            .to_items
            .iter()
            .map(|item| ItemMove::new(item, &self.to_worker, &self.from_worker));
        outgoing.chain(incoming).collect()
    }

    /// 从 pending 进入终态，每个提议只能发生一次
    pub fn transition(
        &mut self,
        to: ProposalState,
        by: &str,
        at: DateTime<Utc>,
    ) -> FairshareResult<()> {
        if self.is_terminal() || !to.is_terminal() {
            return Err(FairshareError::InvalidTransition {
                id: self.id.to_string(),
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        self.resolved_at = Some(at);
        self.resolved_by = Some(by.to_string());
        Ok(())
    }

    pub fn reject(
        &mut self,
        reason: RejectionReason,
        by: &str,
        at: DateTime<Utc>,
    ) -> FairshareResult<()> {
        self.transition(ProposalState::Rejected, by, at)?;
        self.rejection = Some(reason);
        Ok(())
    }
}

/// 提议查询条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalFilter {
    pub worker_id: Option<String>,
    pub state: Option<ProposalState>,
}

impl ProposalFilter {
    pub fn pending() -> Self {
        Self {
            worker_id: None,
            state: Some(ProposalState::Pending),
        }
    }

    pub fn matches(&self, proposal: &SwapProposal) -> bool {
        if let Some(worker_id) = &self.worker_id {
            if !proposal.involves_worker(worker_id) {
                return false;
            }
        }
        if let Some(state) = self.state {
            if proposal.state != state {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn proposal() -> SwapProposal {
        let now = Utc::now();
        SwapProposal {
            id: Uuid::new_v4(),
            from_worker: "a".to_string(),
            to_worker: "b".to_string(),
            from_items: vec!["r-1".to_string(), "r-2".to_string()],
            to_items: vec!["r-9".to_string()],
            compatibility: 0.8,
            reason: "想早点下班".to_string(),
            origin: ProposalOrigin::Worker,
            state: ProposalState::Pending,
            rejection: None,
            baseline_version: 1,
            created_at: now,
            expires_at: now + Duration::minutes(30),
            resolved_at: None,
            resolved_by: None,
        }
    }

    #[test]
    fn test_moves_cover_both_directions() {
        let moves = proposal().moves();
        assert_eq!(moves.len(), 3);
        assert_eq!(moves[0], ItemMove::new("r-1", "a", "b"));
        assert_eq!(moves[2], ItemMove::new("r-9", "b", "a"));
    }

    #[test]
    fn test_transition_happens_once() {
        let mut p = proposal();
        let now = Utc::now();
        p.transition(ProposalState::Accepted, "b", now).unwrap();
        assert_eq!(p.state, ProposalState::Accepted);
        assert_eq!(p.resolved_by.as_deref(), Some("b"));

        let err = p.transition(ProposalState::Cancelled, "a", now).unwrap_err();
        assert!(matches!(err, FairshareError::InvalidTransition { .. }));
        assert_eq!(p.state, ProposalState::Accepted);
    }

    #[test]
    fn test_cannot_transition_back_to_pending() {
        let mut p = proposal();
        assert!(p.transition(ProposalState::Pending, "a", Utc::now()).is_err());
    }

    #[test]
    fn test_reject_records_reason() {
        let mut p = proposal();
        p.reject(RejectionReason::CounterpartyDeclined, "b", Utc::now())
            .unwrap();
        assert_eq!(p.state, ProposalState::Rejected);
        assert_eq!(p.rejection, Some(RejectionReason::CounterpartyDeclined));
    }

    #[test]
    fn test_expiry_and_overlap() {
        let p = proposal();
        assert!(!p.is_past_expiry(p.created_at));
        assert!(p.is_past_expiry(p.expires_at));

        let mut other = proposal();
        other.from_items = vec!["r-7".to_string()];
        other.to_items = vec!["r-2".to_string()];
        assert!(p.overlaps(&other));
        other.to_items = vec!["r-8".to_string()];
        assert!(!p.overlaps(&other));
    }

    #[test]
    fn test_filter_matches() {
        let p = proposal();
        assert!(ProposalFilter::pending().matches(&p));
        let by_worker = ProposalFilter {
            worker_id: Some("c".to_string()),
            state: None,
        };
        assert!(!by_worker.matches(&p));
    }

    #[test]
    fn test_rejection_reason_serialization() {
        let reason = RejectionReason::FairnessToleranceExceeded {
            baseline_gini: 0.1,
            proposed_gini: 0.3,
            limit: 0.11,
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["type"], "fairness_tolerance_exceeded");
        assert!(reason.to_string().contains("0.3000"));
    }
}
