//! 批量优化调度
//!
//! 按CRON计划或手动触发求解，并把结果发布为新的基线版本。
//! 求解失败时保留旧基线，写入审计并发出告警。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use fairshare_config::SchedulerConfig;
use fairshare_domain::{
    baseline_subject, Assignment, AssignmentOrigin, AuditAction, AuditActor, AuditEntry,
    Constraint, ConstraintKind, FairnessDelta, FairshareError, FairshareResult, ProposalFilter,
    WorkItem, Worker,
};
use fairshare_observability::{Alert, AlertSeverity, StructuredLogger};

use crate::baseline::CommitGuard;
use crate::context::EngineContext;
use crate::cron_utils::OptimizationSchedule;
use crate::marketplace::SwapMarketplace;
use crate::solver::{AssignmentSolver, SolveOutcome, SolveRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationTrigger {
    Scheduled,
    Manual,
}

impl OptimizationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationTrigger::Scheduled => "scheduled",
            OptimizationTrigger::Manual => "manual",
        }
    }
}

/// 一次成功的批量优化
#[derive(Debug, Clone)]
pub struct OptimizationReport {
    pub assignment: Arc<Assignment>,
    pub gini_before: Option<f64>,
    pub churn: usize,
    pub round_robin_gini: f64,
    pub invalidated_proposals: Vec<Uuid>,
    pub capacity_override: bool,
    pub duration_ms: u64,
}

/// 已求解、尚未提交的结果
struct Solved {
    guard: CommitGuard,
    previous: Option<Arc<Assignment>>,
    outcome: SolveOutcome,
    capacity_override: bool,
}

/// 持锁期间失败，失败记录沿用同一把锁
struct Unsolved {
    guard: CommitGuard,
    error: FairshareError,
}

struct Inputs {
    items: Vec<WorkItem>,
    workers: Vec<Worker>,
    constraints: Vec<Constraint>,
    previous: Option<Arc<Assignment>>,
}

pub struct OptimizationScheduler {
    ctx: EngineContext,
    solver: Arc<AssignmentSolver>,
    marketplace: Arc<SwapMarketplace>,
    config: SchedulerConfig,
    schedule: OptimizationSchedule,
    running: Arc<tokio::sync::RwLock<bool>>,
}

impl OptimizationScheduler {
    pub fn new(
        ctx: EngineContext,
        solver: Arc<AssignmentSolver>,
        marketplace: Arc<SwapMarketplace>,
        config: SchedulerConfig,
    ) -> FairshareResult<Self> {
        let schedule = OptimizationSchedule::new(&config.cron)?;
        Ok(Self {
            ctx,
            solver,
            marketplace,
            config,
            schedule,
            running: Arc::new(tokio::sync::RwLock::new(false)),
        })
    }

    pub fn schedule(&self) -> &OptimizationSchedule {
        &self.schedule
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.config.run_timeout_seconds)
    }

    /// 立即执行一次批量优化。
    ///
    /// 拿锁与求解受 `timeout` 约束，超时后不产生任何状态变化；提交阶段不可取消。
    #[instrument(skip_all, fields(trigger = trigger.as_str()))]
    pub async fn run_now(
        &self,
        trigger: OptimizationTrigger,
        timeout: Option<Duration>,
    ) -> FairshareResult<OptimizationReport> {
        let timeout = timeout.unwrap_or_else(|| self.default_timeout());
        let started = Instant::now();
        let cancel = Arc::new(AtomicBool::new(false));

        let solved = match tokio::time::timeout(timeout, self.prepare(trigger, cancel.clone())).await
        {
            Ok(Ok(solved)) => solved,
            Ok(Err(Unsolved { guard, error })) => {
                return Err(self.record_failure(trigger, error, Some(guard)).await)
            }
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                let err = FairshareError::timeout(format!(
                    "批量优化超过 {}ms 未完成",
                    timeout.as_millis()
                ));
                // 超时可能发生在等锁阶段，失败记录最多再等一个超时周期
                let guard = match self.ctx.ledger.lock_within(timeout).await {
                    Ok(guard) => Some(guard),
                    Err(_) => {
                        warn!("提交锁仍被占用，失败记录不经提交锁写入");
                        None
                    }
                };
                return Err(self.record_failure(trigger, err, guard).await);
            }
        };

        self.commit(trigger, solved, started).await
    }

    async fn load_inputs(&self) -> FairshareResult<Inputs> {
        Ok(Inputs {
            items: self.ctx.roster.list_work_items().await?,
            workers: self.ctx.roster.list_workers().await?,
            constraints: self.ctx.roster.list_constraints().await?,
            previous: self.ctx.ledger.current().await?,
        })
    }

    async fn prepare(
        &self,
        trigger: OptimizationTrigger,
        cancel: Arc<AtomicBool>,
    ) -> Result<Solved, Unsolved> {
        let guard = self.ctx.ledger.lock().await;
        match self.solve_locked(trigger, cancel).await {
            Ok((previous, outcome, capacity_override)) => Ok(Solved {
                guard,
                previous,
                outcome,
                capacity_override,
            }),
            Err(error) => Err(Unsolved { guard, error }),
        }
    }

    /// 调用方持有提交锁
    async fn solve_locked(
        &self,
        trigger: OptimizationTrigger,
        cancel: Arc<AtomicBool>,
    ) -> FairshareResult<(Option<Arc<Assignment>>, SolveOutcome, bool)> {
        let inputs = Arc::new(self.load_inputs().await?);
        StructuredLogger::log_optimization_started(
            trigger.as_str(),
            inputs.items.len(),
            inputs.workers.len(),
        );

        match self
            .solve_blocking(inputs.clone(), inputs.constraints.clone(), cancel.clone())
            .await
        {
            Ok(outcome) => Ok((inputs.previous.clone(), outcome, false)),
            Err(FairshareError::Infeasible { binding })
                if self.config.allow_capacity_override
                    && binding.iter().any(|b| b.kind == ConstraintKind::Capacity.as_str()) =>
            {
                warn!("容量约束不可行，按配置放宽为软约束后重新求解");
                let relaxed: Vec<Constraint> = inputs
                    .constraints
                    .iter()
                    .cloned()
                    .map(|c| {
                        if c.kind == ConstraintKind::Capacity {
                            let weight = c.penalty_weight;
                            c.soft(weight)
                        } else {
                            c
                        }
                    })
                    .collect();
                match self.solve_blocking(inputs.clone(), relaxed, cancel).await {
                    Ok(outcome) => Ok((inputs.previous.clone(), outcome, true)),
                    Err(FairshareError::Infeasible { .. }) => {
                        Err(FairshareError::infeasible(binding))
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn solve_blocking(
        &self,
        inputs: Arc<Inputs>,
        constraints: Vec<Constraint>,
        cancel: Arc<AtomicBool>,
    ) -> FairshareResult<SolveOutcome> {
        let solver = self.solver.clone();
        tokio::task::spawn_blocking(move || {
            let request = SolveRequest {
                items: &inputs.items,
                workers: &inputs.workers,
                constraints: &constraints,
                previous: inputs.previous.as_ref().map(|p| &p.placements),
            };
            solver.solve(&request, &cancel)
        })
        .await
        .map_err(|e| FairshareError::Internal(format!("求解任务异常退出: {e}")))?
    }

    async fn commit(
        &self,
        trigger: OptimizationTrigger,
        solved: Solved,
        started: Instant,
    ) -> FairshareResult<OptimizationReport> {
        let Solved {
            guard,
            previous,
            outcome,
            capacity_override,
        } = solved;
        let now = self.ctx.clock.now();
        let version = previous.as_ref().map_or(1, |p| p.version + 1);

        // 先处理到期的提议，剩下的未决提议在新基线发布后作废
        let expired = self.marketplace.expire_due(&guard, now).await?;
        let pending: Vec<Uuid> = self
            .ctx
            .proposals
            .list(&ProposalFilter::pending())
            .await?
            .iter()
            .map(|p| p.id)
            .collect();

        let delta = FairnessDelta {
            gini_before: previous.as_ref().map_or(0.0, |p| p.snapshot.gini),
            gini_after: outcome.snapshot.gini,
            variance_before: previous.as_ref().map_or(0.0, |p| p.snapshot.variance),
            variance_after: outcome.snapshot.variance,
        };
        let (action, origin) = if capacity_override {
            (AuditAction::ViolationOverridden, AssignmentOrigin::CapacityOverride)
        } else {
            (AuditAction::BaselinePublished, AssignmentOrigin::Optimization)
        };
        let details = json!({
            "trigger": trigger.as_str(),
            "previous_version": previous.as_ref().map(|p| p.version),
            "before": previous.as_ref().map(|p| &p.snapshot.per_worker_load),
            "after": &outcome.snapshot.per_worker_load,
            "constraints": &outcome.report.outcomes,
            "violations": &outcome.report.violations,
            "churn": outcome.churn,
            "round_robin_gini": outcome.round_robin_gini,
            "invalidated_proposals": &pending,
            "expired_proposals": &expired,
        });
        let mut entry = AuditEntry::new(AuditActor::Scheduler, action, baseline_subject(version), now)
            .with_reason(format!(
                "{}触发批量优化，Gini {:.4} -> {:.4}",
                trigger.as_str(),
                delta.gini_before,
                delta.gini_after
            ))
            .with_fairness(delta)
            .with_details(details);
        if capacity_override {
            entry = entry.flagged();
        }
        self.ctx.audit.record(entry).await?;

        let assignment = Assignment {
            version,
            created_at: now,
            origin,
            placements: outcome.placements,
            snapshot: outcome.snapshot,
            reference_gini: delta.gini_after,
            reference_version: version,
            constraint_report: outcome.report,
        };
        let published = self.ctx.ledger.publish(&guard, assignment).await?;

        // 批量优化结果优先，未决提议一律作废
        let invalidated = self
            .marketplace
            .supersede_pending(&guard, version, now)
            .await;
        if invalidated.len() < pending.len() {
            warn!(
                "基线 {} 已发布，但 {} 个未决提议未能作废",
                version,
                pending.len() - invalidated.len()
            );
        }
        drop(guard);

        let elapsed = started.elapsed();
        self.ctx.metrics.record_optimization_run(elapsed.as_secs_f64());
        self.ctx.metrics.update_baseline(version, published.snapshot.gini);
        StructuredLogger::log_baseline_published(
            version,
            if capacity_override { "capacity_override" } else { "optimization" },
            delta.gini_before,
            delta.gini_after,
            outcome.churn,
            elapsed.as_millis() as u64,
        );
        if capacity_override {
            StructuredLogger::log_capacity_override(
                version,
                published.constraint_report.soft_violations().count(),
            );
        }

        Ok(OptimizationReport {
            assignment: published,
            gini_before: previous.as_ref().map(|p| p.snapshot.gini),
            churn: outcome.churn,
            round_robin_gini: outcome.round_robin_gini,
            invalidated_proposals: invalidated,
            capacity_override,
            duration_ms: elapsed.as_millis() as u64,
        })
    }

    /// 记录失败：审计、告警、指标。审计写入失败时返回持久化错误。
    async fn record_failure(
        &self,
        trigger: OptimizationTrigger,
        err: FairshareError,
        _guard: Option<CommitGuard>,
    ) -> FairshareError {
        let binding: Vec<String> = err
            .binding_constraints()
            .unwrap_or_default()
            .iter()
            .map(|b| b.name.clone())
            .collect();
        let kind = match &err {
            FairshareError::Infeasible { .. } => "infeasible",
            FairshareError::Timeout(_) => "timeout",
            _ => "error",
        };
        self.ctx.metrics.record_optimization_failure(kind);
        StructuredLogger::log_optimization_failed(trigger.as_str(), &err.to_string(), &binding);

        let current_version = match self.ctx.ledger.current().await {
            Ok(current) => current.map_or(0, |c| c.version),
            Err(e) => {
                error!("读取当前基线失败: {}", e);
                0
            }
        };
        let entry = AuditEntry::new(
            AuditActor::Scheduler,
            AuditAction::OptimizationFailed,
            baseline_subject(current_version),
            self.ctx.clock.now(),
        )
        .with_reason(err.to_string())
        .with_details(json!({
            "trigger": trigger.as_str(),
            "kind": kind,
            "binding": err.binding_constraints().unwrap_or_default(),
        }));
        if let Err(audit_err) = self.ctx.audit.record(entry).await {
            return audit_err;
        }

        let mut alert = Alert::new(
            format!("optimization_{kind}"),
            if matches!(err, FairshareError::Infeasible { .. }) {
                AlertSeverity::Error
            } else {
                AlertSeverity::Warning
            },
            err.to_string(),
        )
        .with_label("trigger", trigger.as_str())
        .with_label("baseline_version", current_version.to_string());
        for name in &binding {
            alert = alert.with_label("constraint", name.as_str());
        }
        if let Err(e) = self.ctx.alerts.send_alert(alert) {
            error!("发送告警失败: {}", e);
        }
        err
    }

    /// 启动CRON驱动的调度循环，直到 `stop` 被调用
    pub async fn start(&self) -> FairshareResult<()> {
        if !self.config.enabled {
            info!("批量优化调度已禁用");
            return Ok(());
        }
        {
            let mut running = self.running.write().await;
            *running = true;
        }
        info!("启动批量优化调度: {}", self.schedule.expression());
        self.schedule_loop().await;
        Ok(())
    }

    pub async fn stop(&self) {
        info!("停止批量优化调度");
        let mut running = self.running.write().await;
        *running = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    async fn schedule_loop(&self) {
        let tick = Duration::from_secs(self.config.tick_interval_seconds.max(1));
        let mut last_check = self.ctx.clock.now();

        loop {
            if !*self.running.read().await {
                info!("收到停止信号，退出批量优化调度循环");
                break;
            }

            let now = self.ctx.clock.now();
            if self.schedule.should_trigger(Some(last_check), now) {
                match self.run_now(OptimizationTrigger::Scheduled, None).await {
                    Ok(report) => info!(
                        "定时批量优化完成，基线版本 {}，Gini {:.4}",
                        report.assignment.version, report.assignment.snapshot.gini
                    ),
                    Err(e) if e.is_business_outcome() => warn!("定时批量优化不可行: {}", e),
                    Err(e) => error!("定时批量优化失败: {}", e),
                }
            } else {
                debug!("未到批量优化触发时间");
            }
            last_check = now;

            tokio::time::sleep(tick).await;
        }
    }
}

