#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use fairshare_config::{MarketplaceConfig, SchedulerConfig, SolverConfig};
use fairshare_domain::*;
use fairshare_engine::{index_items, EngineContext, FairnessEngine, LoadModel, Repositories};
use fairshare_infrastructure::{
    InMemoryAuditRepository, InMemoryBaselineRepository, InMemoryProposalRepository,
    InMemoryRosterRepository,
};
use fairshare_observability::MetricsCollector;
use fairshare_testing_utils::{ManualClock, RecordingAlertChannel};

pub struct HarnessOptions {
    pub scheduler: SchedulerConfig,
    pub marketplace: MarketplaceConfig,
    pub audit: Option<Arc<dyn AuditRepository>>,
    pub constraints: Vec<Constraint>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            marketplace: MarketplaceConfig::default(),
            audit: None,
            constraints: Constraint::default_set(),
        }
    }
}

/// 内存仓储 + 手动时钟组成的引擎
pub struct Harness {
    pub engine: FairnessEngine,
    pub roster: Arc<InMemoryRosterRepository>,
    pub baselines: Arc<InMemoryBaselineRepository>,
    pub proposals: Arc<InMemoryProposalRepository>,
    pub audit: Arc<InMemoryAuditRepository>,
    pub clock: Arc<ManualClock>,
    pub alerts: Arc<RecordingAlertChannel>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let roster = Arc::new(InMemoryRosterRepository::with_constraints(options.constraints));
        let baselines = Arc::new(InMemoryBaselineRepository::new());
        let proposals = Arc::new(InMemoryProposalRepository::new());
        let audit = Arc::new(InMemoryAuditRepository::new());
        let clock = Arc::new(ManualClock::new());
        let alerts = Arc::new(RecordingAlertChannel::new());

        let audit_repository: Arc<dyn AuditRepository> = match options.audit {
            Some(custom) => custom,
            None => audit.clone(),
        };
        let ctx = EngineContext::new(
            Repositories {
                roster: roster.clone(),
                proposals: proposals.clone(),
                baselines: baselines.clone(),
                audit: audit_repository,
            },
            clock.clone(),
            Arc::new(MetricsCollector::new().unwrap()),
            alerts.clone(),
            LoadModel::default(),
        );
        let engine = FairnessEngine::new(
            ctx,
            SolverConfig::default(),
            options.scheduler,
            options.marketplace,
        )
        .unwrap();

        Self {
            engine,
            roster,
            baselines,
            proposals,
            audit,
            clock,
            alerts,
        }
    }

    pub async fn load(&self, workers: Vec<Worker>, items: Vec<WorkItem>) {
        self.engine.load_roster(workers, items, None).await.unwrap();
    }

    /// 直接发布一个指定的批量优化基线，绕过求解器
    pub async fn publish(&self, placements: &[(&str, &str)]) -> Arc<Assignment> {
        let placements: BTreeMap<String, String> = placements
            .iter()
            .map(|(item, worker)| (item.to_string(), worker.to_string()))
            .collect();
        let items = self.roster.list_work_items().await.unwrap();
        let workers = self.roster.list_workers().await.unwrap();
        let snapshot = LoadModel::default().snapshot_of(&placements, &index_items(&items), &workers);
        let version = self
            .baselines
            .current()
            .await
            .unwrap()
            .map_or(1, |a| a.version + 1);
        let assignment = Assignment {
            version,
            created_at: self.clock.now(),
            origin: AssignmentOrigin::Optimization,
            placements,
            reference_gini: snapshot.gini,
            reference_version: version,
            snapshot,
            constraint_report: EvaluationReport::default(),
        };
        self.baselines.append(assignment).await.unwrap()
    }

    pub async fn audit_actions(&self) -> Vec<AuditAction> {
        self.audit
            .snapshot()
            .await
            .into_iter()
            .map(|e| e.action)
            .collect()
    }

    pub async fn current(&self) -> Arc<Assignment> {
        self.engine.get_current_assignment().await.unwrap()
    }
}

pub fn worker(id: &str, max: u32) -> Worker {
    Worker::new(id, 0, max)
}

pub fn route(id: &str, difficulty: f64) -> WorkItem {
    WorkItem::new(id, difficulty, 60, "central")
}

pub fn swap(from: &str, to: &str, from_items: &[&str], to_items: &[&str]) -> fairshare_engine::ProposeSwap {
    fairshare_engine::ProposeSwap {
        from_worker: from.to_string(),
        to_worker: to.to_string(),
        from_items: from_items.iter().map(|s| s.to_string()).collect(),
        to_items: to_items.iter().map(|s| s.to_string()).collect(),
        reason: "测试".to_string(),
    }
}
