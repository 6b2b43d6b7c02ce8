//! 换班市场
//!
//! 提议的每次状态迁移都在基线提交锁内完成：先写审计，再改状态。
//! 接受换班前依次检查：基线是否已被批量优化取代、工作项归属是否仍然成立、
//! 双方是否可用、硬约束、Gini容差。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use fairshare_config::MarketplaceConfig;
use fairshare_domain::{
    proposal_subject, Assignment, AssignmentOrigin, AuditAction, AuditActor, AuditEntry,
    EvaluationReport, FairnessDelta, FairnessSnapshot, FairshareError, FairshareResult,
    ProposalFilter, ProposalOrigin, ProposalState, RejectionReason, SwapDecision, SwapProposal,
    WorkItem, Worker,
};
use fairshare_observability::StructuredLogger;

use crate::baseline::CommitGuard;
use crate::compatibility::CompatibilityScorer;
use crate::constraints::{CandidateAssignment, ConstraintEvaluator, EvaluationScope};
use crate::context::EngineContext;
use crate::fairness::{gini, index_items};

const GINI_EPS: f64 = 1e-12;

/// 发起换班的请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposeSwap {
    pub from_worker: String,
    pub to_worker: String,
    #[serde(default)]
    pub from_items: Vec<String>,
    #[serde(default)]
    pub to_items: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

impl ProposeSwap {
    pub fn validate(&self) -> FairshareResult<()> {
        if self.from_worker == self.to_worker {
            return Err(FairshareError::validation_error("不能与自己换班"));
        }
        if self.from_items.is_empty() && self.to_items.is_empty() {
            return Err(FairshareError::validation_error("换班至少涉及一个工作项"));
        }
        let mut seen = BTreeSet::new();
        for item in self.from_items.iter().chain(self.to_items.iter()) {
            if !seen.insert(item.as_str()) {
                return Err(FairshareError::validation_error(format!(
                    "工作项 {item} 在提议中重复出现"
                )));
            }
        }
        Ok(())
    }
}

enum Verdict {
    Accept(AcceptedSwap),
    Reject(RejectionReason),
}

struct AcceptedSwap {
    baseline: Arc<Assignment>,
    placements: BTreeMap<String, String>,
    snapshot: FairnessSnapshot,
    report: EvaluationReport,
}

struct Suggestion {
    from: String,
    to: String,
    from_items: Vec<String>,
    to_items: Vec<String>,
    gini_after: f64,
}

impl Suggestion {
    fn item_ids(&self) -> impl Iterator<Item = &String> {
        self.from_items.iter().chain(self.to_items.iter())
    }
}

pub struct SwapMarketplace {
    ctx: EngineContext,
    config: MarketplaceConfig,
    scorer: CompatibilityScorer,
}

impl SwapMarketplace {
    pub fn new(ctx: EngineContext, config: MarketplaceConfig) -> Self {
        let scorer = CompatibilityScorer::new(config.compatibility.clone(), ctx.proposals.clone());
        Self {
            ctx,
            config,
            scorer,
        }
    }

    pub fn config(&self) -> &MarketplaceConfig {
        &self.config
    }

    fn response_timeout(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or_else(|| Duration::from_secs(self.config.response_timeout_seconds))
    }

    pub async fn get_proposal(&self, id: Uuid) -> FairshareResult<SwapProposal> {
        self.ctx
            .proposals
            .get(id)
            .await?
            .ok_or_else(|| FairshareError::proposal_not_found(id.to_string()))
    }

    pub async fn list_proposals(&self, filter: &ProposalFilter) -> FairshareResult<Vec<SwapProposal>> {
        self.ctx.proposals.list(filter).await
    }

    /// Worker发起换班
    pub async fn propose(&self, request: ProposeSwap) -> FairshareResult<SwapProposal> {
        request.validate()?;
        let guard = self.ctx.ledger.lock_within(self.response_timeout(None)).await?;
        self.propose_locked(&guard, request, ProposalOrigin::Worker)
            .await
    }

    async fn propose_locked(
        &self,
        _guard: &CommitGuard,
        request: ProposeSwap,
        origin: ProposalOrigin,
    ) -> FairshareResult<SwapProposal> {
        let from = self.require_worker(&request.from_worker).await?;
        let to = self.require_worker(&request.to_worker).await?;
        let baseline = self.ctx.ledger.require_current().await?;
        let from_items = self.held_items(&baseline, &from.id, &request.from_items).await?;
        let to_items = self.held_items(&baseline, &to.id, &request.to_items).await?;
        let compatibility = self.scorer.score(&from, &to, &from_items, &to_items).await?;

        let now = self.ctx.clock.now();
        let mut proposal = SwapProposal {
            id: Uuid::new_v4(),
            from_worker: from.id.clone(),
            to_worker: to.id.clone(),
            from_items: request.from_items,
            to_items: request.to_items,
            compatibility,
            reason: request.reason,
            origin,
            state: ProposalState::Pending,
            rejection: None,
            baseline_version: baseline.version,
            created_at: now,
            expires_at: now + chrono::Duration::minutes(self.config.proposal_ttl_minutes),
            resolved_at: None,
            resolved_by: None,
        };

        let actor = match origin {
            ProposalOrigin::Worker => AuditActor::worker(&from.id),
            ProposalOrigin::System => AuditActor::Marketplace,
        };
        self.ctx
            .audit
            .record(
                AuditEntry::new(actor, AuditAction::SwapProposed, proposal_subject(&proposal.id), now)
                    .with_reason(proposal.reason.clone())
                    .with_details(json!({
                        "from_worker": &proposal.from_worker,
                        "to_worker": &proposal.to_worker,
                        "from_items": &proposal.from_items,
                        "to_items": &proposal.to_items,
                        "compatibility": compatibility,
                        "origin": origin,
                        "baseline_version": baseline.version,
                    })),
            )
            .await?;

        // 暂停中的Worker不能参与换班，提议直接被拒绝
        if let Some(suspended) = [&from, &to].into_iter().find(|w| w.is_suspended()) {
            let reason = RejectionReason::WorkerSuspended {
                worker_id: suspended.id.clone(),
            };
            proposal.reject(reason.clone(), "marketplace", now)?;
            self.audit_rejection(&proposal, &reason, AuditActor::Marketplace, now)
                .await?;
        }

        self.ctx.proposals.insert(&proposal).await?;
        self.ctx.metrics.record_swap_proposed();
        StructuredLogger::log_swap_proposed(
            &proposal.id.to_string(),
            &proposal.from_worker,
            &proposal.to_worker,
            proposal.from_items.len() + proposal.to_items.len(),
            compatibility,
            match origin {
                ProposalOrigin::Worker => "worker",
                ProposalOrigin::System => "system",
            },
        );
        if let Some(reason) = &proposal.rejection {
            self.ctx.metrics.record_swap_rejected(reason.code());
            StructuredLogger::log_swap_decision(
                &proposal.id.to_string(),
                proposal.state.as_str(),
                "marketplace",
                Some(reason.code()),
                None,
            );
        }
        Ok(proposal)
    }

    /// 对方答复换班。`timeout` 覆盖等待提交锁与接受检查，超时不改变任何状态。
    #[instrument(skip(self, timeout), fields(proposal_id = %id))]
    pub async fn respond(
        &self,
        id: Uuid,
        responder: &str,
        decision: SwapDecision,
        timeout: Option<Duration>,
    ) -> FairshareResult<SwapProposal> {
        let timeout = self.response_timeout(timeout);
        let deadline = Instant::now() + timeout;
        let guard = self.ctx.ledger.lock_within(timeout).await?;

        let now = self.ctx.clock.now();
        let target = match decision {
            SwapDecision::Accept => ProposalState::Accepted,
            SwapDecision::Reject => ProposalState::Rejected,
        };
        let proposal = self.get_proposal(id).await?;
        let proposal = self.ensure_pending(proposal, target, now).await?;
        if proposal.to_worker != responder {
            return Err(FairshareError::Permission(format!(
                "只有 {} 可以答复提议 {}",
                proposal.to_worker, id
            )));
        }

        match decision {
            SwapDecision::Reject => {
                self.finish_rejection(
                    proposal,
                    RejectionReason::CounterpartyDeclined,
                    AuditActor::worker(responder),
                    now,
                )
                .await
            }
            SwapDecision::Accept => {
                let verdict = tokio::time::timeout_at(deadline, self.evaluate(&proposal))
                    .await
                    .map_err(|_| {
                        FairshareError::timeout(format!(
                            "换班 {} 的接受检查超过 {}ms",
                            id,
                            timeout.as_millis()
                        ))
                    })??;
                match verdict {
                    Verdict::Reject(reason) => {
                        self.finish_rejection(proposal, reason, AuditActor::Marketplace, now)
                            .await
                    }
                    Verdict::Accept(accepted) => {
                        self.commit_accept(&guard, proposal, accepted, now).await
                    }
                }
            }
        }
    }

    /// 提议人或管理员撤回
    pub async fn cancel(&self, id: Uuid, actor: AuditActor) -> FairshareResult<SwapProposal> {
        let _guard = self.ctx.ledger.lock_within(self.response_timeout(None)).await?;
        let now = self.ctx.clock.now();
        let proposal = self.get_proposal(id).await?;
        let mut proposal = self
            .ensure_pending(proposal, ProposalState::Cancelled, now)
            .await?;

        let permitted = match &actor {
            AuditActor::Worker(worker_id) => *worker_id == proposal.from_worker,
            AuditActor::Admin(_) => true,
            _ => false,
        };
        if !permitted {
            return Err(FairshareError::Permission(format!(
                "{actor} 无权撤回提议 {id}"
            )));
        }

        proposal.transition(ProposalState::Cancelled, &actor.to_string(), now)?;
        self.ctx
            .audit
            .record(
                AuditEntry::new(
                    actor.clone(),
                    AuditAction::SwapCancelled,
                    proposal_subject(&proposal.id),
                    now,
                )
                .with_reason("提议被撤回"),
            )
            .await?;
        self.store(&proposal).await?;
        StructuredLogger::log_swap_decision(
            &proposal.id.to_string(),
            proposal.state.as_str(),
            &actor.to_string(),
            None,
            None,
        );
        Ok(proposal)
    }

    /// 把所有已到期的 pending 提议标记为 expired，返回处理数量。可重复执行。
    pub async fn expire_stale(&self) -> FairshareResult<usize> {
        let guard = self.ctx.ledger.lock().await;
        let now = self.ctx.clock.now();
        Ok(self.expire_due(&guard, now).await?.len())
    }

    /// 把到期的 pending 提议迁移到 expired，返回被迁移的提议。调用方必须持有提交锁。
    pub async fn expire_due(
        &self,
        _guard: &CommitGuard,
        now: chrono::DateTime<chrono::Utc>,
    ) -> FairshareResult<Vec<Uuid>> {
        let mut expired = Vec::new();
        for proposal in self.ctx.proposals.list(&ProposalFilter::pending()).await? {
            let id = proposal.id;
            if proposal.is_past_expiry(now) && self.expire(proposal, now).await? {
                expired.push(id);
            }
        }
        if !expired.is_empty() {
            self.ctx.metrics.record_swaps_expired(expired.len() as u64);
            info!("{} 个换班提议已过期", expired.len());
        }
        Ok(expired)
    }

    /// 新基线发布后作废全部未决提议，调用方必须持有提交锁。
    ///
    /// 基线已经生效，单个提议处理失败只记录错误并继续，返回成功作废的提议。
    pub async fn supersede_pending(
        &self,
        _guard: &CommitGuard,
        version: u64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Vec<Uuid> {
        let pending = match self.ctx.proposals.list(&ProposalFilter::pending()).await {
            Ok(pending) => pending,
            Err(e) => {
                error!("读取未决提议失败，基线 {} 未能作废旧提议: {}", version, e);
                return Vec::new();
            }
        };

        let mut superseded = Vec::new();
        for proposal in pending {
            let id = proposal.id;
            if proposal.is_past_expiry(now) {
                if let Err(e) = self.expire(proposal, now).await {
                    error!("提议 {} 过期处理失败: {}", id, e);
                }
                continue;
            }
            let reason = RejectionReason::BaselineSuperseded { version };
            match self
                .finish_rejection(proposal, reason, AuditActor::Scheduler, now)
                .await
            {
                Ok(_) => superseded.push(id),
                Err(e) => error!("作废提议 {} 失败: {}", id, e),
            }
        }
        superseded
    }

    /// Worker被暂停时拒绝其全部未决提议，调用方必须持有提交锁
    pub async fn reject_pending_for_worker(
        &self,
        _guard: &CommitGuard,
        worker_id: &str,
    ) -> FairshareResult<Vec<Uuid>> {
        let now = self.ctx.clock.now();
        let filter = ProposalFilter {
            worker_id: Some(worker_id.to_string()),
            state: Some(ProposalState::Pending),
        };
        let mut rejected = Vec::new();
        for proposal in self.ctx.proposals.list(&filter).await? {
            if proposal.is_past_expiry(now) {
                self.expire(proposal, now).await?;
                continue;
            }
            let id = proposal.id;
            let reason = RejectionReason::WorkerSuspended {
                worker_id: worker_id.to_string(),
            };
            self.finish_rejection(proposal, reason, AuditActor::System, now)
                .await?;
            rejected.push(id);
        }
        Ok(rejected)
    }

    /// 在当前基线上寻找能降低Gini的换班，以系统身份发起。
    ///
    /// 只考虑负载最高与最低的几名可用Worker之间的一换零、一换一，按兼容度排序。
    pub async fn suggest_swaps(&self, limit: Option<usize>) -> FairshareResult<Vec<SwapProposal>> {
        let limit = limit.unwrap_or(self.config.max_suggestions);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let guard = self.ctx.ledger.lock_within(self.response_timeout(None)).await?;
        let baseline = self.ctx.ledger.require_current().await?;
        let workers = self.ctx.roster.list_workers().await?;
        let items = self.ctx.roster.list_work_items().await?;
        let constraints = self.ctx.roster.list_constraints().await?;
        let busy: BTreeSet<String> = self
            .ctx
            .proposals
            .list(&ProposalFilter::pending())
            .await?
            .iter()
            .flat_map(|p| p.item_ids().map(str::to_string).collect::<Vec<_>>())
            .collect();

        let index = index_items(&items);
        let loads = self
            .ctx
            .load_model
            .loads(&baseline.placements, &index, &workers);
        let current = gini(&loads.values().copied().collect::<Vec<_>>());

        let mut ranked: Vec<(&String, f64)> = workers
            .iter()
            .filter(|w| w.is_available())
            .filter_map(|w| loads.get(&w.id).map(|load| (&w.id, *load)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(b.0)));
        const SPAN: usize = 3;
        let heavy: Vec<&String> = ranked.iter().take(SPAN).map(|(id, _)| *id).collect();
        let light: Vec<&String> = ranked.iter().rev().take(SPAN).map(|(id, _)| *id).collect();

        let item_load = |id: &str| {
            index
                .get(id)
                .map(|item| self.ctx.load_model.item_load(item))
                .unwrap_or(0.0)
        };
        let gini_after = |from: &str, to: &str, delta: f64| {
            let values: Vec<f64> = loads
                .iter()
                .map(|(worker, load)| {
                    if worker == from {
                        load - delta
                    } else if worker == to {
                        load + delta
                    } else {
                        *load
                    }
                })
                .collect();
            gini(&values)
        };

        let mut moves = Vec::new();
        for from in &heavy {
            for to in &light {
                if from == to || loads[*from] <= loads[*to] {
                    continue;
                }
                let giving: Vec<&str> = baseline
                    .items_of(from.as_str())
                    .filter(|i| !busy.contains(*i))
                    .collect();
                let taking: Vec<&str> = baseline
                    .items_of(to.as_str())
                    .filter(|i| !busy.contains(*i))
                    .collect();
                for give in &giving {
                    let g = item_load(*give);
                    let after = gini_after(from.as_str(), to.as_str(), g);
                    if after < current - GINI_EPS {
                        moves.push(Suggestion {
                            from: from.to_string(),
                            to: to.to_string(),
                            from_items: vec![give.to_string()],
                            to_items: Vec::new(),
                            gini_after: after,
                        });
                    }
                    for take in &taking {
                        let t = item_load(*take);
                        if g <= t {
                            continue;
                        }
                        let after = gini_after(from.as_str(), to.as_str(), g - t);
                        if after < current - GINI_EPS {
                            moves.push(Suggestion {
                                from: from.to_string(),
                                to: to.to_string(),
                                from_items: vec![give.to_string()],
                                to_items: vec![take.to_string()],
                                gini_after: after,
                            });
                        }
                    }
                }
            }
        }
        moves.sort_by(|a, b| {
            a.gini_after
                .total_cmp(&b.gini_after)
                .then_with(|| {
                    (&a.from, &a.to, &a.from_items, &a.to_items)
                        .cmp(&(&b.from, &b.to, &b.from_items, &b.to_items))
                })
        });

        let evaluator = ConstraintEvaluator::new(self.ctx.load_model.clone());
        let by_id: HashMap<&str, &Worker> = workers.iter().map(|w| (w.id.as_str(), w)).collect();
        let mut claimed: BTreeSet<String> = BTreeSet::new();
        let mut pool: Vec<(f64, Suggestion)> = Vec::new();
        for suggestion in moves {
            if pool.len() >= limit * SPAN {
                break;
            }
            if suggestion.item_ids().any(|i| claimed.contains(i)) {
                continue;
            }
            let mut placements = baseline.placements.clone();
            for item in &suggestion.from_items {
                placements.insert(item.clone(), suggestion.to.clone());
            }
            for item in &suggestion.to_items {
                placements.insert(item.clone(), suggestion.from.clone());
            }
            let report = evaluator.evaluate(
                &CandidateAssignment {
                    placements: &placements,
                    items: &items,
                    workers: &workers,
                },
                &constraints,
                &EvaluationScope::workers([suggestion.from.clone(), suggestion.to.clone()]),
            );
            if !report.is_feasible() {
                continue;
            }
            let (Some(from), Some(to)) = (
                by_id.get(suggestion.from.as_str()),
                by_id.get(suggestion.to.as_str()),
            ) else {
                continue;
            };
            let pick = |ids: &[String]| -> Vec<WorkItem> {
                ids.iter()
                    .filter_map(|id| index.get(id.as_str()).map(|item| (*item).clone()))
                    .collect()
            };
            let compatibility = self
                .scorer
                .score(from, to, &pick(&suggestion.from_items), &pick(&suggestion.to_items))
                .await?;
            claimed.extend(suggestion.item_ids().cloned());
            pool.push((compatibility, suggestion));
        }
        pool.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.gini_after.total_cmp(&b.1.gini_after)));

        let mut filed = Vec::new();
        for (_, suggestion) in pool.into_iter().take(limit) {
            let request = ProposeSwap {
                reason: format!(
                    "系统推荐：Gini {:.4} -> {:.4}",
                    current, suggestion.gini_after
                ),
                from_worker: suggestion.from,
                to_worker: suggestion.to,
                from_items: suggestion.from_items,
                to_items: suggestion.to_items,
            };
            filed.push(
                self.propose_locked(&guard, request, ProposalOrigin::System)
                    .await?,
            );
        }
        debug!("生成 {} 条系统换班推荐", filed.len());
        Ok(filed)
    }

    async fn require_worker(&self, id: &str) -> FairshareResult<Worker> {
        self.ctx
            .roster
            .get_worker(id)
            .await?
            .ok_or_else(|| FairshareError::worker_not_found(id))
    }

    /// 工作项必须存在且在当前基线中属于该Worker
    async fn held_items(
        &self,
        baseline: &Assignment,
        worker_id: &str,
        ids: &[String],
    ) -> FairshareResult<Vec<WorkItem>> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let item = self
                .ctx
                .roster
                .get_work_item(id)
                .await?
                .ok_or_else(|| FairshareError::work_item_not_found(id.as_str()))?;
            if baseline.worker_of(id) != Some(worker_id) {
                return Err(FairshareError::conflict(format!(
                    "工作项 {id} 当前不属于 {worker_id}"
                )));
            }
            items.push(item);
        }
        Ok(items)
    }

    /// 已到期的先标记为 expired；终态提议不能再迁移
    async fn ensure_pending(
        &self,
        proposal: SwapProposal,
        target: ProposalState,
        now: chrono::DateTime<chrono::Utc>,
    ) -> FairshareResult<SwapProposal> {
        let invalid = |from: ProposalState| FairshareError::InvalidTransition {
            id: proposal.id.to_string(),
            from: from.to_string(),
            to: target.to_string(),
        };
        if proposal.is_past_expiry(now) {
            let err = invalid(ProposalState::Expired);
            self.expire(proposal, now).await?;
            return Err(err);
        }
        if proposal.is_terminal() {
            return Err(invalid(proposal.state));
        }
        Ok(proposal)
    }

    /// 接受前的检查，只读
    async fn evaluate(&self, proposal: &SwapProposal) -> FairshareResult<Verdict> {
        let baseline = self.ctx.ledger.require_current().await?;
        if proposal.baseline_version < baseline.reference_version {
            return Ok(Verdict::Reject(RejectionReason::BaselineSuperseded {
                version: baseline.reference_version,
            }));
        }

        let moves = proposal.moves();
        for item_move in &moves {
            if baseline.worker_of(&item_move.item_id) != Some(item_move.from_worker.as_str()) {
                self.ctx.metrics.record_swap_conflict();
                StructuredLogger::log_swap_conflict(&proposal.id.to_string(), &item_move.item_id);
                return Err(FairshareError::conflict(format!(
                    "工作项 {} 已不属于 {}，请基于最新基线重新发起",
                    item_move.item_id, item_move.from_worker
                )));
            }
        }

        let workers = self.ctx.roster.list_workers().await?;
        for id in [&proposal.from_worker, &proposal.to_worker] {
            let worker = workers
                .iter()
                .find(|w| &w.id == id)
                .ok_or_else(|| FairshareError::worker_not_found(id.as_str()))?;
            if worker.is_suspended() {
                return Ok(Verdict::Reject(RejectionReason::WorkerSuspended {
                    worker_id: id.clone(),
                }));
            }
        }

        let items = self.ctx.roster.list_work_items().await?;
        let constraints = self.ctx.roster.list_constraints().await?;
        let mut placements = baseline.placements.clone();
        for item_move in &moves {
            placements.insert(item_move.item_id.clone(), item_move.to_worker.clone());
        }
        let candidate = CandidateAssignment {
            placements: &placements,
            items: &items,
            workers: &workers,
        };
        let evaluator = ConstraintEvaluator::new(self.ctx.load_model.clone());
        let scoped = evaluator.evaluate(
            &candidate,
            &constraints,
            &EvaluationScope::workers([proposal.from_worker.clone(), proposal.to_worker.clone()]),
        );
        if let Some(violation) = scoped.first_hard_violation() {
            return Ok(Verdict::Reject(RejectionReason::ConstraintViolation {
                constraint: violation.constraint.clone(),
                kind: violation.kind.as_str().to_string(),
                detail: violation.detail.clone(),
            }));
        }

        let snapshot = self
            .ctx
            .load_model
            .snapshot_of(&placements, &index_items(&items), &workers);
        let limit = baseline.reference_gini * (1.0 + self.config.fairness_tolerance);
        if snapshot.gini > limit + GINI_EPS {
            return Ok(Verdict::Reject(RejectionReason::FairnessToleranceExceeded {
                baseline_gini: baseline.reference_gini,
                proposed_gini: snapshot.gini,
                limit,
            }));
        }

        let report = evaluator.evaluate(&candidate, &constraints, &EvaluationScope::All);
        Ok(Verdict::Accept(AcceptedSwap {
            baseline,
            placements,
            snapshot,
            report,
        }))
    }

    async fn commit_accept(
        &self,
        guard: &CommitGuard,
        mut proposal: SwapProposal,
        accepted: AcceptedSwap,
        now: chrono::DateTime<chrono::Utc>,
    ) -> FairshareResult<SwapProposal> {
        let AcceptedSwap {
            baseline,
            placements,
            snapshot,
            report,
        } = accepted;
        let version = baseline.version + 1;
        let delta = FairnessDelta {
            gini_before: baseline.snapshot.gini,
            gini_after: snapshot.gini,
            variance_before: baseline.snapshot.variance,
            variance_after: snapshot.variance,
        };

        self.ctx
            .audit
            .record(
                AuditEntry::new(
                    AuditActor::worker(&proposal.to_worker),
                    AuditAction::SwapAccepted,
                    proposal_subject(&proposal.id),
                    now,
                )
                .with_reason(format!(
                    "换班已接受，Gini {:.4} -> {:.4}",
                    delta.gini_before, delta.gini_after
                ))
                .with_fairness(delta)
                .with_details(json!({
                    "baseline_version": version,
                    "moves": proposal.moves(),
                    "soft_violations": report.soft_violations().collect::<Vec<_>>(),
                })),
            )
            .await?;

        let assignment = Assignment {
            version,
            created_at: now,
            origin: AssignmentOrigin::Swap {
                proposal_id: proposal.id,
            },
            placements,
            snapshot,
            reference_gini: baseline.reference_gini,
            reference_version: baseline.reference_version,
            constraint_report: report,
        };
        let published = self.ctx.ledger.publish(guard, assignment).await?;

        let responder = proposal.to_worker.clone();
        proposal.transition(ProposalState::Accepted, &responder, now)?;
        self.store(&proposal).await?;

        self.ctx.metrics.record_swap_accepted();
        self.ctx
            .metrics
            .update_baseline(published.version, published.snapshot.gini);
        StructuredLogger::log_swap_decision(
            &proposal.id.to_string(),
            proposal.state.as_str(),
            &responder,
            None,
            Some(published.version),
        );
        Ok(proposal)
    }

    async fn audit_rejection(
        &self,
        proposal: &SwapProposal,
        reason: &RejectionReason,
        actor: AuditActor,
        now: chrono::DateTime<chrono::Utc>,
    ) -> FairshareResult<()> {
        self.ctx
            .audit
            .record(
                AuditEntry::new(actor, AuditAction::SwapRejected, proposal_subject(&proposal.id), now)
                    .with_reason(reason.to_string())
                    .with_details(serde_json::to_value(reason)?),
            )
            .await?;
        Ok(())
    }

    async fn finish_rejection(
        &self,
        mut proposal: SwapProposal,
        reason: RejectionReason,
        actor: AuditActor,
        now: chrono::DateTime<chrono::Utc>,
    ) -> FairshareResult<SwapProposal> {
        proposal.reject(reason.clone(), &actor.to_string(), now)?;
        self.audit_rejection(&proposal, &reason, actor.clone(), now)
            .await?;
        self.store(&proposal).await?;
        self.ctx.metrics.record_swap_rejected(reason.code());
        StructuredLogger::log_swap_decision(
            &proposal.id.to_string(),
            proposal.state.as_str(),
            &actor.to_string(),
            Some(&reason.to_string()),
            None,
        );
        Ok(proposal)
    }

    /// 返回是否由本次调用完成迁移
    async fn expire(
        &self,
        mut proposal: SwapProposal,
        now: chrono::DateTime<chrono::Utc>,
    ) -> FairshareResult<bool> {
        if !proposal.is_past_expiry(now) {
            return Ok(false);
        }
        proposal.transition(ProposalState::Expired, "marketplace", now)?;
        self.ctx
            .audit
            .record(
                AuditEntry::new(
                    AuditActor::Marketplace,
                    AuditAction::SwapExpired,
                    proposal_subject(&proposal.id),
                    now,
                )
                .with_reason(format!("提议已于 {} 过期", proposal.expires_at)),
            )
            .await?;
        let stored = self
            .ctx
            .proposals
            .compare_and_update(ProposalState::Pending, &proposal)
            .await?;
        if stored {
            StructuredLogger::log_proposal_expired(&proposal.id.to_string(), proposal.expires_at);
        } else {
            warn!("提议 {} 已被其他操作处理，跳过过期", proposal.id);
        }
        Ok(stored)
    }

    async fn store(&self, proposal: &SwapProposal) -> FairshareResult<()> {
        if self
            .ctx
            .proposals
            .compare_and_update(ProposalState::Pending, proposal)
            .await?
        {
            Ok(())
        } else {
            Err(FairshareError::conflict(format!(
                "提议 {} 已被其他操作处理",
                proposal.id
            )))
        }
    }
}
