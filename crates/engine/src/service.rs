//! 引擎对外接口
//!
//! 仪表盘、HTTP层与进程入口都只通过 [`FairnessEngine`] 访问引擎。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use fairshare_config::{MarketplaceConfig, SchedulerConfig, SolverConfig};
use fairshare_domain::{
    Assignment, AuditActor, AuditFilter, AuditPage, AuditQuery, AvailabilityEvent, Constraint,
    FairnessHistoryPoint, FairshareResult, ProposalFilter, SwapDecision, SwapProposal, WorkItem,
    Worker,
};

use crate::availability::{AvailabilityListener, AvailabilityOutcome};
use crate::context::EngineContext;
use crate::marketplace::{ProposeSwap, SwapMarketplace};
use crate::scheduler::{OptimizationReport, OptimizationScheduler, OptimizationTrigger};
use crate::solver::AssignmentSolver;
use crate::sweeper::ExpirySweeper;

#[derive(Clone)]
pub struct FairnessEngine {
    ctx: EngineContext,
    scheduler: Arc<OptimizationScheduler>,
    marketplace: Arc<SwapMarketplace>,
    availability: Arc<AvailabilityListener>,
    sweeper: Arc<ExpirySweeper>,
}

impl FairnessEngine {
    pub fn new(
        ctx: EngineContext,
        solver: SolverConfig,
        scheduler: SchedulerConfig,
        marketplace: MarketplaceConfig,
    ) -> FairshareResult<Self> {
        let solver = Arc::new(AssignmentSolver::new(solver, ctx.load_model.clone()));
        let marketplace = Arc::new(SwapMarketplace::new(ctx.clone(), marketplace));
        let scheduler = Arc::new(OptimizationScheduler::new(
            ctx.clone(),
            solver,
            marketplace.clone(),
            scheduler,
        )?);
        let availability = Arc::new(AvailabilityListener::new(ctx.clone(), marketplace.clone()));
        let sweeper = Arc::new(ExpirySweeper::from_marketplace(marketplace.clone()));
        Ok(Self {
            ctx,
            scheduler,
            marketplace,
            availability,
            sweeper,
        })
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn scheduler(&self) -> Arc<OptimizationScheduler> {
        self.scheduler.clone()
    }

    pub fn marketplace(&self) -> Arc<SwapMarketplace> {
        self.marketplace.clone()
    }

    pub fn availability_listener(&self) -> Arc<AvailabilityListener> {
        self.availability.clone()
    }

    pub fn sweeper(&self) -> Arc<ExpirySweeper> {
        self.sweeper.clone()
    }

    /// 替换当前周期的Worker、工作项与约束集
    pub async fn load_roster(
        &self,
        workers: Vec<Worker>,
        items: Vec<WorkItem>,
        constraints: Option<Vec<Constraint>>,
    ) -> FairshareResult<()> {
        for worker in &workers {
            worker.validate()?;
        }
        for item in &items {
            item.validate()?;
        }
        if let Some(constraints) = &constraints {
            for constraint in constraints {
                constraint.validate()?;
            }
        }

        let _guard = self.ctx.ledger.lock().await;
        for worker in &workers {
            self.ctx.roster.upsert_worker(worker).await?;
        }
        let item_count = items.len();
        self.ctx.roster.replace_work_items(items).await?;
        if let Some(constraints) = constraints {
            self.ctx.roster.set_constraints(constraints).await?;
        }
        info!(
            "已载入 {} 名Worker与 {} 个工作项",
            workers.len(),
            item_count
        );
        Ok(())
    }

    pub async fn get_current_assignment(&self) -> FairshareResult<Arc<Assignment>> {
        self.ctx.ledger.require_current().await
    }

    pub async fn get_assignment(&self, version: u64) -> FairshareResult<Option<Arc<Assignment>>> {
        self.ctx.ledger.get(version).await
    }

    pub async fn get_fairness_history(
        &self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> FairshareResult<Vec<FairnessHistoryPoint>> {
        self.ctx.ledger.history(from, until).await
    }

    #[instrument(skip_all, fields(from = %request.from_worker, to = %request.to_worker))]
    pub async fn propose_swap(&self, request: ProposeSwap) -> FairshareResult<SwapProposal> {
        self.marketplace.propose(request).await
    }

    #[instrument(skip(self, timeout))]
    pub async fn respond_to_swap(
        &self,
        id: Uuid,
        responder: &str,
        decision: SwapDecision,
        timeout: Option<Duration>,
    ) -> FairshareResult<SwapProposal> {
        self.marketplace
            .respond(id, responder, decision, timeout)
            .await
    }

    pub async fn run_optimization_now(
        &self,
        timeout: Option<Duration>,
    ) -> FairshareResult<OptimizationReport> {
        self.scheduler
            .run_now(OptimizationTrigger::Manual, timeout)
            .await
    }

    pub async fn get_audit_log(
        &self,
        filter: &AuditFilter,
        after: Option<u64>,
        page_size: usize,
    ) -> FairshareResult<AuditPage> {
        self.ctx.audit.page(filter, after, page_size).await
    }

    pub fn audit_query(&self, filter: AuditFilter) -> AuditQuery {
        self.ctx.audit.query(filter)
    }

    pub async fn get_proposal(&self, id: Uuid) -> FairshareResult<SwapProposal> {
        self.marketplace.get_proposal(id).await
    }

    pub async fn list_proposals(&self, filter: &ProposalFilter) -> FairshareResult<Vec<SwapProposal>> {
        self.marketplace.list_proposals(filter).await
    }

    pub async fn cancel_swap(&self, id: Uuid, actor: AuditActor) -> FairshareResult<SwapProposal> {
        self.marketplace.cancel(id, actor).await
    }

    pub async fn suggest_swaps(&self, limit: Option<usize>) -> FairshareResult<Vec<SwapProposal>> {
        self.marketplace.suggest_swaps(limit).await
    }

    pub async fn expire_stale_proposals(&self) -> FairshareResult<usize> {
        self.marketplace.expire_stale().await
    }

    pub async fn apply_availability(
        &self,
        event: AvailabilityEvent,
    ) -> FairshareResult<AvailabilityOutcome> {
        self.availability.apply(&event).await
    }
}
