use std::sync::Arc;

use fairshare_domain::{
    AuditRepository, BaselineRepository, Clock, ProposalRepository, RosterRepository,
};
use fairshare_observability::{AlertChannel, MetricsCollector};

use crate::audit_trail::AuditTrail;
use crate::baseline::BaselineLedger;
use crate::fairness::LoadModel;

/// 引擎各服务共享的依赖
#[derive(Clone)]
pub struct EngineContext {
    pub roster: Arc<dyn RosterRepository>,
    pub proposals: Arc<dyn ProposalRepository>,
    pub ledger: Arc<BaselineLedger>,
    pub audit: Arc<AuditTrail>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<MetricsCollector>,
    pub alerts: Arc<dyn AlertChannel>,
    pub load_model: LoadModel,
}

/// 存储层
pub struct Repositories {
    pub roster: Arc<dyn RosterRepository>,
    pub proposals: Arc<dyn ProposalRepository>,
    pub baselines: Arc<dyn BaselineRepository>,
    pub audit: Arc<dyn AuditRepository>,
}

impl EngineContext {
    pub fn new(
        repositories: Repositories,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
        alerts: Arc<dyn AlertChannel>,
        load_model: LoadModel,
    ) -> Self {
        Self {
            roster: repositories.roster,
            proposals: repositories.proposals,
            ledger: Arc::new(BaselineLedger::new(repositories.baselines)),
            audit: Arc::new(AuditTrail::new(repositories.audit)),
            clock,
            metrics,
            alerts,
            load_model,
        }
    }
}
