use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constraint::EvaluationReport;
use crate::value_objects::FairnessHistoryPoint;

/// 某一时刻负载分布的公平性快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FairnessSnapshot {
    pub gini: f64,
    pub variance: f64,
    pub std_dev: f64,
    /// 最大负载 / 最小非零负载
    pub min_max_ratio: f64,
    pub mean_load: f64,
    pub per_worker_load: BTreeMap<String, f64>,
    pub underserved_count: usize,
    pub overserved_count: usize,
}

/// 基线版本的来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssignmentOrigin {
    /// 批量优化产出
    Optimization,
    /// 放宽容量约束后的批量优化，已记入审计
    CapacityOverride,
    /// 已接受的换班
    Swap { proposal_id: Uuid },
}

impl AssignmentOrigin {
    /// 批量优化产出的版本会重置公平性参考值
    pub fn is_optimization(&self) -> bool {
        matches!(
            self,
            AssignmentOrigin::Optimization | AssignmentOrigin::CapacityOverride
        )
    }
}

/// 基线分配：工作项 → Worker，每个工作项恰好属于一个Worker。
///
/// 发布后不可变；换班或再优化产生新版本。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub origin: AssignmentOrigin,
    /// item_id -> worker_id
    pub placements: BTreeMap<String, String>,
    pub snapshot: FairnessSnapshot,
    /// 最近一次批量优化的Gini系数，换班容差以此为参照
    pub reference_gini: f64,
    /// 最近一次批量优化产出的版本号
    pub reference_version: u64,
    pub constraint_report: EvaluationReport,
}

impl Assignment {
    pub fn worker_of(&self, item_id: &str) -> Option<&str> {
        self.placements.get(item_id).map(String::as_str)
    }

    pub fn items_of<'a>(&'a self, worker_id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.placements
            .iter()
            .filter(move |(_, w)| w.as_str() == worker_id)
            .map(|(item, _)| item.as_str())
    }

    pub fn item_count(&self) -> usize {
        self.placements.len()
    }

    pub fn counts_by_worker(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for worker in self.placements.values() {
            *counts.entry(worker.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn history_point(&self) -> FairnessHistoryPoint {
        FairnessHistoryPoint {
            version: self.version,
            timestamp: self.created_at,
            gini: self.snapshot.gini,
            variance: self.snapshot.variance,
            underserved_count: self.snapshot.underserved_count,
            overserved_count: self.snapshot.overserved_count,
        }
    }
}
