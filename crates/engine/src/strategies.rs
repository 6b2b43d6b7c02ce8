//! 初始方案策略
//!
//! 每个策略只给出每个工作项的“首选Worker”，可行性由求解器的最大流修复保证。

use std::collections::BTreeMap;

use tracing::debug;

use fairshare_domain::{WorkItem, Worker};

use crate::solver::Problem;

pub trait SeedStrategy: Send + Sync {
    /// 每个工作项（按 Problem 中的顺序）的首选Worker下标
    fn preferred(&self, problem: &Problem<'_>) -> Vec<Option<usize>>;

    fn name(&self) -> &str;
}

/// 不给出偏好，完全由最大流决定
pub struct MaxFlowSeed;

impl SeedStrategy for MaxFlowSeed {
    fn preferred(&self, problem: &Problem<'_>) -> Vec<Option<usize>> {
        vec![None; problem.item_count()]
    }

    fn name(&self) -> &str {
        "MaxFlow"
    }
}

/// 按工作项ID顺序轮流分给允许的Worker
pub struct RoundRobinSeed;

impl SeedStrategy for RoundRobinSeed {
    fn preferred(&self, problem: &Problem<'_>) -> Vec<Option<usize>> {
        let worker_count = problem.worker_count();
        if worker_count == 0 {
            return vec![None; problem.item_count()];
        }
        let mut counts = vec![0usize; worker_count];
        let mut cursor = 0usize;
        (0..problem.item_count())
            .map(|item| {
                let selected = (0..worker_count)
                    .map(|offset| (cursor + offset) % worker_count)
                    .find(|w| problem.is_allowed(item, *w) && counts[*w] < problem.max_cap[*w]);
                if let Some(w) = selected {
                    counts[w] += 1;
                    cursor = (w + 1) % worker_count;
                }
                selected
            })
            .collect()
    }

    fn name(&self) -> &str {
        "RoundRobin"
    }
}

/// 最长处理时间优先：负载大的工作项先分给当前负载最小的Worker
pub struct LeastLoadedSeed;

impl SeedStrategy for LeastLoadedSeed {
    fn preferred(&self, problem: &Problem<'_>) -> Vec<Option<usize>> {
        let mut order: Vec<usize> = (0..problem.item_count()).collect();
        order.sort_by(|a, b| {
            problem.item_load[*b]
                .total_cmp(&problem.item_load[*a])
                .then(a.cmp(b))
        });

        let mut loads = problem.base_load.clone();
        let mut counts = vec![0usize; problem.worker_count()];
        let mut preferred = vec![None; problem.item_count()];
        for item in order {
            let selected = problem.allowed[item]
                .iter()
                .copied()
                .filter(|w| counts[*w] < problem.max_cap[*w])
                .min_by(|a, b| loads[*a].total_cmp(&loads[*b]).then(a.cmp(b)));
            if let Some(w) = selected {
                loads[w] += problem.item_load[item];
                counts[w] += 1;
                preferred[item] = Some(w);
            }
        }
        preferred
    }

    fn name(&self) -> &str {
        "LeastLoaded"
    }
}

/// 尽量保留上一版基线中的归属
pub struct PreviousAssignmentSeed;

impl SeedStrategy for PreviousAssignmentSeed {
    fn preferred(&self, problem: &Problem<'_>) -> Vec<Option<usize>> {
        match &problem.previous {
            Some(previous) => previous.clone(),
            None => {
                debug!("没有上一版基线，保留策略退化为最大流");
                vec![None; problem.item_count()]
            }
        }
    }

    fn name(&self) -> &str {
        "PreviousAssignment"
    }
}

/// 朴素轮询基线：工作项与可用Worker均按ID排序，第 i 个工作项分给第 i mod n 个Worker，
/// 不考虑任何约束。求解结果的Gini系数不应劣于它。
pub fn round_robin_baseline(items: &[WorkItem], workers: &[Worker]) -> BTreeMap<String, String> {
    let mut available: Vec<&Worker> = workers.iter().filter(|w| w.is_available()).collect();
    available.sort_by(|a, b| a.id.cmp(&b.id));
    if available.is_empty() {
        return BTreeMap::new();
    }
    let mut sorted_items: Vec<&WorkItem> = items.iter().collect();
    sorted_items.sort_by(|a, b| a.id.cmp(&b.id));
    sorted_items
        .into_iter()
        .enumerate()
        .map(|(i, item)| (item.id.clone(), available[i % available.len()].id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairshare_domain::{Availability, Constraint};

    fn fleet() -> (Vec<WorkItem>, Vec<Worker>) {
        let items = vec![
            WorkItem::new("r-1", 90.0, 60, "north"),
            WorkItem::new("r-2", 10.0, 60, "north"),
            WorkItem::new("r-3", 50.0, 60, "north"),
            WorkItem::new("r-4", 50.0, 60, "north"),
        ];
        let workers = vec![Worker::new("a", 0, 3), Worker::new("b", 0, 3)];
        (items, workers)
    }

    #[test]
    fn test_round_robin_baseline_ignores_suspended_workers() {
        let (items, mut workers) = fleet();
        let mut suspended = Worker::new("aa", 0, 3);
        suspended.availability = Availability::Suspended;
        workers.push(suspended);
        let placements = round_robin_baseline(&items, &workers);
        assert_eq!(placements["r-1"], "a");
        assert_eq!(placements["r-2"], "b");
        assert_eq!(placements["r-3"], "a");
        assert_eq!(placements["r-4"], "b");
    }

    #[test]
    fn test_least_loaded_seed_balances() {
        let (items, workers) = fleet();
        let constraints = Constraint::default_set();
        let problem = Problem::build(&items, &workers, &constraints, None, &Default::default()).unwrap();
        let preferred = LeastLoadedSeed.preferred(&problem);
        // 90 -> a, 50 -> b, 50 -> b, 10 -> a  => a=100, b=100
        assert_eq!(preferred, vec![Some(0), Some(0), Some(1), Some(1)]);
        assert_eq!(LeastLoadedSeed.name(), "LeastLoaded");
    }

    #[test]
    fn test_round_robin_seed_respects_caps() {
        let (items, mut workers) = fleet();
        workers[0].capacity_max = 1;
        let constraints = Constraint::default_set();
        let problem = Problem::build(&items, &workers, &constraints, None, &Default::default()).unwrap();
        let preferred = RoundRobinSeed.preferred(&problem);
        assert_eq!(preferred, vec![Some(0), Some(1), Some(1), Some(1)]);
    }
}
