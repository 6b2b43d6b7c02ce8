//! 约束评估
//!
//! 同一组谓词既用于批量求解的完整方案，也用于换班后的方案。
//! 换班评估时把范围限定在参与换班的Worker上，其他Worker的既有状态不影响结果。

use std::collections::{BTreeMap, BTreeSet, HashMap};

use fairshare_domain::{
    Constraint, ConstraintKind, ConstraintOutcome, ConstraintViolation, EvaluationReport,
    WorkItem, Worker,
};

use crate::fairness::LoadModel;

/// 评估范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationScope {
    /// 完整方案：所有工作项和所有Worker
    All,
    /// 仅检查这些Worker及其持有的工作项
    Workers(BTreeSet<String>),
}

impl EvaluationScope {
    pub fn workers<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EvaluationScope::Workers(ids.into_iter().map(Into::into).collect())
    }

    fn includes(&self, worker_id: &str) -> bool {
        match self {
            EvaluationScope::All => true,
            EvaluationScope::Workers(ids) => ids.contains(worker_id),
        }
    }
}

/// 待评估的候选方案
pub struct CandidateAssignment<'a> {
    pub placements: &'a BTreeMap<String, String>,
    pub items: &'a [WorkItem],
    pub workers: &'a [Worker],
}

pub struct ConstraintEvaluator {
    load_model: LoadModel,
}

struct Tally {
    outcomes: Vec<ConstraintOutcome>,
    violations: Vec<ConstraintViolation>,
}

impl Tally {
    fn record(&mut self, name: &str, kind: ConstraintKind, hard: bool, found: Vec<ConstraintViolation>) {
        self.outcomes.push(ConstraintOutcome {
            name: name.to_string(),
            kind,
            hard,
            satisfied: found.is_empty(),
            violation_count: found.len(),
        });
        self.violations.extend(found);
    }
}

impl ConstraintEvaluator {
    pub fn new(load_model: LoadModel) -> Self {
        Self { load_model }
    }

    pub fn load_model(&self) -> &LoadModel {
        &self.load_model
    }

    pub fn evaluate(
        &self,
        candidate: &CandidateAssignment<'_>,
        constraints: &[Constraint],
        scope: &EvaluationScope,
    ) -> EvaluationReport {
        let items: HashMap<&str, &WorkItem> =
            candidate.items.iter().map(|i| (i.id.as_str(), i)).collect();
        let workers: HashMap<&str, &Worker> =
            candidate.workers.iter().map(|w| (w.id.as_str(), w)).collect();

        let mut tally = Tally {
            outcomes: Vec::new(),
            violations: Vec::new(),
        };

        tally.record(
            "coverage",
            ConstraintKind::Coverage,
            true,
            self.check_coverage(candidate, &items, &workers, scope),
        );
        tally.record(
            "availability",
            ConstraintKind::Availability,
            true,
            self.check_availability(candidate, &workers, scope),
        );

        for constraint in constraints {
            let found = match constraint.kind {
                ConstraintKind::Capacity => self.check_capacity(constraint, candidate, scope),
                ConstraintKind::Eligibility | ConstraintKind::Regional => {
                    self.check_pairwise(constraint, candidate, &items, &workers, scope)
                }
                ConstraintKind::DifficultyBand => {
                    self.check_band(constraint, candidate, &items, scope)
                }
                // 内置约束已在上面统一检查
                ConstraintKind::Availability | ConstraintKind::Coverage => continue,
            };
            tally.record(&constraint.name, constraint.kind, constraint.is_hard(), found);
        }

        let violated_count = tally.outcomes.iter().filter(|o| !o.satisfied).count();
        let penalty_total = tally.violations.iter().map(|v| v.penalty).sum();
        EvaluationReport {
            satisfied_count: tally.outcomes.len() - violated_count,
            violated_count,
            penalty_total,
            outcomes: tally.outcomes,
            violations: tally.violations,
        }
    }

    fn check_coverage(
        &self,
        candidate: &CandidateAssignment<'_>,
        items: &HashMap<&str, &WorkItem>,
        workers: &HashMap<&str, &Worker>,
        scope: &EvaluationScope,
    ) -> Vec<ConstraintViolation> {
        let mut found = Vec::new();
        let violation = |item_id: &str, worker_id: Option<&str>, detail: String| ConstraintViolation {
            constraint: "coverage".to_string(),
            kind: ConstraintKind::Coverage,
            hard: true,
            worker_id: worker_id.map(str::to_string),
            item_id: Some(item_id.to_string()),
            detail,
            penalty: 0.0,
        };

        if matches!(scope, EvaluationScope::All) {
            for item in candidate.items {
                if !candidate.placements.contains_key(&item.id) {
                    found.push(violation(&item.id, None, format!("工作项 {} 未分配", item.id)));
                }
            }
        }
        for (item_id, worker_id) in candidate.placements {
            if !scope.includes(worker_id) {
                continue;
            }
            if !items.contains_key(item_id.as_str()) {
                found.push(violation(
                    item_id,
                    Some(worker_id),
                    format!("工作项 {item_id} 不在当前规划周期内"),
                ));
            } else if !workers.contains_key(worker_id.as_str()) {
                found.push(violation(
                    item_id,
                    Some(worker_id),
                    format!("工作项 {item_id} 分配给了未知Worker {worker_id}"),
                ));
            }
        }
        found
    }

    fn check_availability(
        &self,
        candidate: &CandidateAssignment<'_>,
        workers: &HashMap<&str, &Worker>,
        scope: &EvaluationScope,
    ) -> Vec<ConstraintViolation> {
        candidate
            .placements
            .iter()
            .filter(|(_, worker_id)| scope.includes(worker_id))
            .filter_map(|(item_id, worker_id)| {
                let worker = workers.get(worker_id.as_str())?;
                worker.is_suspended().then(|| ConstraintViolation {
                    constraint: "availability".to_string(),
                    kind: ConstraintKind::Availability,
                    hard: true,
                    worker_id: Some(worker_id.clone()),
                    item_id: Some(item_id.clone()),
                    detail: format!("Worker {worker_id} 处于暂停状态，不能持有工作项 {item_id}"),
                    penalty: 0.0,
                })
            })
            .collect()
    }

    fn check_capacity(
        &self,
        constraint: &Constraint,
        candidate: &CandidateAssignment<'_>,
        scope: &EvaluationScope,
    ) -> Vec<ConstraintViolation> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for worker_id in candidate.placements.values() {
            *counts.entry(worker_id.as_str()).or_insert(0) += 1;
        }

        let mut found = Vec::new();
        for worker in candidate.workers.iter().filter(|w| scope.includes(&w.id)) {
            let count = counts.get(worker.id.as_str()).copied().unwrap_or(0);
            // 暂停的Worker不再接收工作项，下限不适用
            let min = if worker.is_suspended() { 0 } else { worker.capacity_min as usize };
            let max = worker.capacity_max as usize;
            let (excess, detail) = if count > max {
                (count - max, format!("Worker {} 持有 {} 个工作项，超过上限 {}", worker.id, count, max))
            } else if count < min {
                (min - count, format!("Worker {} 持有 {} 个工作项，低于下限 {}", worker.id, count, min))
            } else {
                continue;
            };
            found.push(self.violation(constraint, Some(&worker.id), None, detail, excess as f64));
        }
        found
    }

    fn check_pairwise(
        &self,
        constraint: &Constraint,
        candidate: &CandidateAssignment<'_>,
        items: &HashMap<&str, &WorkItem>,
        workers: &HashMap<&str, &Worker>,
        scope: &EvaluationScope,
    ) -> Vec<ConstraintViolation> {
        let mut found = Vec::new();
        for (item_id, worker_id) in candidate.placements {
            if !scope.includes(worker_id) {
                continue;
            }
            let (Some(item), Some(worker)) =
                (items.get(item_id.as_str()), workers.get(worker_id.as_str()))
            else {
                continue;
            };
            if pair_allowed(constraint.kind, item, worker) {
                continue;
            }
            let detail = match constraint.kind {
                ConstraintKind::Eligibility => format!(
                    "Worker {} 缺少工作项 {} 要求的资质 {:?}",
                    worker.id,
                    item.id,
                    item.required_tags.difference(&worker.tags).collect::<Vec<_>>()
                ),
                _ => format!("Worker {} 不服务工作项 {} 所在区域 {}", worker.id, item.id, item.zone),
            };
            found.push(self.violation(constraint, Some(&worker.id), Some(&item.id), detail, 1.0));
        }
        found
    }

    fn check_band(
        &self,
        constraint: &Constraint,
        candidate: &CandidateAssignment<'_>,
        items: &HashMap<&str, &WorkItem>,
        scope: &EvaluationScope,
    ) -> Vec<ConstraintViolation> {
        let loads = self
            .load_model
            .loads(candidate.placements, items, candidate.workers);
        band_excess(&loads, constraint.band_tolerance())
            .into_iter()
            .filter(|(worker_id, _, _)| scope.includes(worker_id))
            .map(|(worker_id, load, excess)| {
                let detail = format!(
                    "Worker {} 的负载 {:.1} 偏离平均值超过 {:.0}%",
                    worker_id,
                    load,
                    constraint.band_tolerance() * 100.0
                );
                self.violation(constraint, Some(&worker_id), None, detail, excess)
            })
            .collect()
    }

    fn violation(
        &self,
        constraint: &Constraint,
        worker_id: Option<&str>,
        item_id: Option<&str>,
        detail: String,
        magnitude: f64,
    ) -> ConstraintViolation {
        let hard = constraint.is_hard();
        ConstraintViolation {
            constraint: constraint.name.clone(),
            kind: constraint.kind,
            hard,
            worker_id: worker_id.map(str::to_string),
            item_id: item_id.map(str::to_string),
            detail,
            penalty: if hard { 0.0 } else { constraint.penalty_weight * magnitude },
        }
    }
}

/// 成对约束对单个 (工作项, Worker) 组合是否成立
pub fn pair_allowed(kind: ConstraintKind, item: &WorkItem, worker: &Worker) -> bool {
    match kind {
        ConstraintKind::Eligibility => worker.has_tags_for(item),
        ConstraintKind::Regional => worker.serves_zone(&item.zone),
        ConstraintKind::Availability => worker.is_available(),
        _ => true,
    }
}

/// 返回超出难度带的Worker及其相对超出量
pub fn band_excess(loads: &BTreeMap<String, f64>, tolerance: f64) -> Vec<(String, f64, f64)> {
    if loads.len() < 2 {
        return Vec::new();
    }
    let mean = loads.values().sum::<f64>() / loads.len() as f64;
    if mean <= 0.0 {
        return Vec::new();
    }
    loads
        .iter()
        .filter_map(|(worker_id, load)| {
            let deviation = (load - mean).abs() / mean;
            (deviation > tolerance + 1e-12)
                .then(|| (worker_id.clone(), *load, deviation - tolerance))
        })
        .collect()
}
