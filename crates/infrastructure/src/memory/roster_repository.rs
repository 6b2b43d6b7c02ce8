use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use fairshare_domain::{Availability, Constraint, RosterRepository, WorkItem, Worker};
use fairshare_errors::{FairshareError, FairshareResult};

#[derive(Debug, Default)]
struct RosterState {
    workers: BTreeMap<String, Worker>,
    items: BTreeMap<String, WorkItem>,
    constraints: Vec<Constraint>,
}

/// 当前规划周期的Worker、工作项与约束集
#[derive(Debug)]
pub struct InMemoryRosterRepository {
    state: RwLock<RosterState>,
}

impl Default for InMemoryRosterRepository {
    fn default() -> Self {
        Self::with_constraints(Constraint::default_set())
    }
}

impl InMemoryRosterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_constraints(constraints: Vec<Constraint>) -> Self {
        Self {
            state: RwLock::new(RosterState {
                constraints,
                ..RosterState::default()
            }),
        }
    }
}

#[async_trait]
impl RosterRepository for InMemoryRosterRepository {
    async fn upsert_worker(&self, worker: &Worker) -> FairshareResult<Worker> {
        worker.validate()?;
        let mut state = self.state.write().await;
        state.workers.insert(worker.id.clone(), worker.clone());
        debug!("保存Worker: {}", worker.id);
        Ok(worker.clone())
    }

    async fn get_worker(&self, id: &str) -> FairshareResult<Option<Worker>> {
        Ok(self.state.read().await.workers.get(id).cloned())
    }

    async fn list_workers(&self) -> FairshareResult<Vec<Worker>> {
        Ok(self.state.read().await.workers.values().cloned().collect())
    }

    async fn set_availability(
        &self,
        id: &str,
        availability: Availability,
    ) -> FairshareResult<Worker> {
        let mut state = self.state.write().await;
        let worker = state
            .workers
            .get_mut(id)
            .ok_or_else(|| FairshareError::worker_not_found(id))?;
        worker.availability = availability;
        Ok(worker.clone())
    }

    async fn replace_work_items(&self, items: Vec<WorkItem>) -> FairshareResult<()> {
        let mut replacement = BTreeMap::new();
        for item in items {
            item.validate()?;
            if replacement.contains_key(&item.id) {
                return Err(FairshareError::validation_error(format!(
                    "工作项 {} 重复",
                    item.id
                )));
            }
            replacement.insert(item.id.clone(), item);
        }
        let mut state = self.state.write().await;
        info!("替换本周期工作项，共 {} 个", replacement.len());
        state.items = replacement;
        Ok(())
    }

    async fn list_work_items(&self) -> FairshareResult<Vec<WorkItem>> {
        Ok(self.state.read().await.items.values().cloned().collect())
    }

    async fn get_work_item(&self, id: &str) -> FairshareResult<Option<WorkItem>> {
        Ok(self.state.read().await.items.get(id).cloned())
    }

    async fn set_constraints(&self, constraints: Vec<Constraint>) -> FairshareResult<()> {
        for constraint in &constraints {
            constraint.validate()?;
        }
        self.state.write().await.constraints = constraints;
        Ok(())
    }

    async fn list_constraints(&self) -> FairshareResult<Vec<Constraint>> {
        Ok(self.state.read().await.constraints.clone())
    }
}
