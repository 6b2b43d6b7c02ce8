//! 公平性指标
//!
//! 纯函数，输入为每个Worker的负载标量，与输入顺序无关。
//! 少于两个Worker时不存在可度量的不平等，全部返回 0。

use std::collections::{BTreeMap, HashMap};

use fairshare_config::FairnessConfig;
use fairshare_domain::{FairnessSnapshot, LoadMetric, WorkItem, Worker};

fn sorted(loads: &[f64]) -> Vec<f64> {
    let mut values = loads.to_vec();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

/// Gini系数，排序后按 (2·Σ i·x_i) / (n·Σx) − (n+1)/n 计算，结果限制在 [0, 1]
pub fn gini(loads: &[f64]) -> f64 {
    let n = loads.len();
    if n < 2 {
        return 0.0;
    }
    let values = sorted(loads);
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = values
        .iter()
        .enumerate()
        .map(|(i, x)| (i as f64 + 1.0) * x)
        .sum();
    let n = n as f64;
    let g = (2.0 * weighted) / (n * total) - (n + 1.0) / n;
    g.clamp(0.0, 1.0)
}

pub fn mean(loads: &[f64]) -> f64 {
    if loads.is_empty() {
        return 0.0;
    }
    loads.iter().sum::<f64>() / loads.len() as f64
}

/// 总体方差
pub fn variance(loads: &[f64]) -> f64 {
    if loads.len() < 2 {
        return 0.0;
    }
    let m = mean(loads);
    let values = sorted(loads);
    values.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / values.len() as f64
}

pub fn std_dev(loads: &[f64]) -> f64 {
    variance(loads).sqrt()
}

/// 最大负载 / 最小非零负载
pub fn min_max_ratio(loads: &[f64]) -> f64 {
    if loads.len() < 2 {
        return 0.0;
    }
    let max = loads.iter().copied().fold(0.0_f64, f64::max);
    let min_non_zero = loads
        .iter()
        .copied()
        .filter(|x| *x > 0.0)
        .fold(f64::INFINITY, f64::min);
    if !min_non_zero.is_finite() {
        return 0.0;
    }
    max / min_non_zero
}

/// 负载口径与统计方式
#[derive(Debug, Clone, PartialEq)]
pub struct LoadModel {
    pub metric: LoadMetric,
    pub history_weight: f64,
    pub imbalance_band: f64,
}

impl Default for LoadModel {
    fn default() -> Self {
        Self::from_config(&FairnessConfig::default())
    }
}

impl LoadModel {
    pub fn from_config(config: &FairnessConfig) -> Self {
        Self {
            metric: config.load_metric,
            history_weight: config.history_weight,
            imbalance_band: config.imbalance_band,
        }
    }

    pub fn item_load(&self, item: &WorkItem) -> f64 {
        item.load(self.metric)
    }

    /// Worker不持有任何工作项时的负载
    pub fn base_load(&self, worker: &Worker) -> f64 {
        self.history_weight * worker.historical_load
    }

    /// 计算每个Worker的负载。
    ///
    /// 纳入统计的是所有可用Worker，以及仍持有工作项的暂停Worker。
    pub fn loads(
        &self,
        placements: &BTreeMap<String, String>,
        items: &HashMap<&str, &WorkItem>,
        workers: &[Worker],
    ) -> BTreeMap<String, f64> {
        let mut loads: BTreeMap<String, f64> = workers
            .iter()
            .filter(|w| w.is_available())
            .map(|w| (w.id.clone(), self.base_load(w)))
            .collect();
        let by_id: HashMap<&str, &Worker> = workers.iter().map(|w| (w.id.as_str(), w)).collect();

        for (item_id, worker_id) in placements {
            let item_load = items
                .get(item_id.as_str())
                .map(|item| self.item_load(item))
                .unwrap_or(0.0);
            let entry = loads.entry(worker_id.clone()).or_insert_with(|| {
                by_id
                    .get(worker_id.as_str())
                    .map(|w| self.base_load(w))
                    .unwrap_or(0.0)
            });
            *entry += item_load;
        }
        loads
    }

    pub fn snapshot(&self, per_worker_load: BTreeMap<String, f64>) -> FairnessSnapshot {
        let values: Vec<f64> = per_worker_load.values().copied().collect();
        let mean_load = mean(&values);
        let (underserved_count, overserved_count) = if values.len() < 2 || mean_load <= 0.0 {
            (0, 0)
        } else {
            let low = mean_load * (1.0 - self.imbalance_band);
            let high = mean_load * (1.0 + self.imbalance_band);
            (
                values.iter().filter(|x| **x < low).count(),
                values.iter().filter(|x| **x > high).count(),
            )
        };
        FairnessSnapshot {
            gini: gini(&values),
            variance: variance(&values),
            std_dev: std_dev(&values),
            min_max_ratio: min_max_ratio(&values),
            mean_load,
            per_worker_load,
            underserved_count,
            overserved_count,
        }
    }

    pub fn snapshot_of(
        &self,
        placements: &BTreeMap<String, String>,
        items: &HashMap<&str, &WorkItem>,
        workers: &[Worker],
    ) -> FairnessSnapshot {
        self.snapshot(self.loads(placements, items, workers))
    }
}

pub fn index_items(items: &[WorkItem]) -> HashMap<&str, &WorkItem> {
    items.iter().map(|item| (item.id.as_str(), item)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_degenerate_inputs_return_zero() {
        assert_eq!(gini(&[]), 0.0);
        assert_eq!(gini(&[42.0]), 0.0);
        assert_eq!(variance(&[42.0]), 0.0);
        assert_eq!(min_max_ratio(&[]), 0.0);
        assert_eq!(gini(&[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_equal_loads_have_zero_gini() {
        assert!(gini(&[250.0, 250.0, 250.0]).abs() < EPS);
        assert!(variance(&[5.0, 5.0]).abs() < EPS);
        assert!((min_max_ratio(&[5.0, 5.0]) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_gini_known_values() {
        // 一人承担全部负载：(n-1)/n
        assert!((gini(&[0.0, 0.0, 0.0, 10.0]) - 0.75).abs() < EPS);
        // [1,2,3,4]: 0.25
        assert!((gini(&[1.0, 2.0, 3.0, 4.0]) - 0.25).abs() < EPS);
    }

    #[test]
    fn test_gini_independent_of_order() {
        let a = gini(&[80.0, 10.0, 35.0, 0.0, 55.0]);
        let b = gini(&[0.0, 55.0, 10.0, 80.0, 35.0]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_gini_stays_in_unit_interval() {
        let samples: [&[f64]; 4] = [
            &[1.0, 1000.0],
            &[0.0, 1e-9],
            &[3.0, 7.0, 11.0, 13.0, 17.0],
            &[100.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ];
        for loads in samples {
            let g = gini(loads);
            assert!((0.0..=1.0).contains(&g), "gini {g} out of range for {loads:?}");
        }
    }

    #[test]
    fn test_variance_and_ratio() {
        assert!((variance(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 4.0).abs() < EPS);
        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.0).abs() < EPS);
        assert!((min_max_ratio(&[0.0, 10.0, 40.0]) - 4.0).abs() < EPS);
    }

    #[test]
    fn test_snapshot_counts_imbalance() {
        let model = LoadModel::default();
        let loads: BTreeMap<String, f64> = [("a", 100.0), ("b", 100.0), ("c", 40.0), ("d", 160.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let snapshot = model.snapshot(loads);
        assert_eq!(snapshot.mean_load, 100.0);
        assert_eq!(snapshot.underserved_count, 1);
        assert_eq!(snapshot.overserved_count, 1);
        assert_eq!(snapshot.per_worker_load["d"], 160.0);
    }

    #[test]
    fn test_loads_include_idle_available_workers() {
        let model = LoadModel::default();
        let items = vec![
            WorkItem::new("r-1", 30.0, 60, "north"),
            WorkItem::new("r-2", 20.0, 45, "north"),
        ];
        let mut suspended = Worker::new("c", 0, 5);
        suspended.availability = fairshare_domain::Availability::Suspended;
        let workers = vec![Worker::new("a", 0, 5), Worker::new("b", 0, 5), suspended];
        let placements: BTreeMap<String, String> = [("r-1", "a"), ("r-2", "a")]
            .into_iter()
            .map(|(i, w)| (i.to_string(), w.to_string()))
            .collect();

        let loads = model.loads(&placements, &index_items(&items), &workers);
        assert_eq!(loads.len(), 2);
        assert_eq!(loads["a"], 50.0);
        assert_eq!(loads["b"], 0.0);

        let by_count = LoadModel {
            metric: LoadMetric::Count,
            ..LoadModel::default()
        };
        let loads = by_count.loads(&placements, &index_items(&items), &workers);
        assert_eq!(loads["a"], 2.0);
    }
}
