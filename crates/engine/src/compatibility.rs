//! 换班兼容度
//!
//! 0-1 的参考分，展示给对方，不参与接受判定。

use std::sync::Arc;

use fairshare_config::CompatibilityWeights;
use fairshare_domain::{
    FairshareResult, ProposalFilter, ProposalRepository, ProposalState, RejectionReason, WorkItem,
    Worker,
};

/// 两个Worker之间的历史换班结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapHistory {
    pub accepted: usize,
    pub declined: usize,
}

impl SwapHistory {
    pub fn satisfaction(&self) -> Option<f64> {
        let total = self.accepted + self.declined;
        (total > 0).then(|| self.accepted as f64 / total as f64)
    }
}

pub struct CompatibilityScorer {
    weights: CompatibilityWeights,
    proposals: Arc<dyn ProposalRepository>,
}

impl CompatibilityScorer {
    pub fn new(weights: CompatibilityWeights, proposals: Arc<dyn ProposalRepository>) -> Self {
        Self { weights, proposals }
    }

    pub async fn score(
        &self,
        from: &Worker,
        to: &Worker,
        from_items: &[WorkItem],
        to_items: &[WorkItem],
    ) -> FairshareResult<f64> {
        let history = self.history_between(&from.id, &to.id).await?;
        Ok(combine(
            &self.weights,
            difficulty_component(from_items, to_items),
            regional_component(from, to, from_items, to_items),
            history.satisfaction(),
        ))
    }

    /// 双方之间所有已决提议中，被接受与被对方拒绝的次数
    pub async fn history_between(&self, a: &str, b: &str) -> FairshareResult<SwapHistory> {
        let filter = ProposalFilter {
            worker_id: Some(a.to_string()),
            state: None,
        };
        let mut history = SwapHistory::default();
        for proposal in self.proposals.list(&filter).await? {
            if !proposal.involves_worker(b) {
                continue;
            }
            match (&proposal.state, &proposal.rejection) {
                (ProposalState::Accepted, _) => history.accepted += 1,
                (ProposalState::Rejected, Some(RejectionReason::CounterpartyDeclined)) => {
                    history.declined += 1
                }
                _ => {}
            }
        }
        Ok(history)
    }
}

/// 交换双方工作项的难度和越接近越好
pub fn difficulty_component(from_items: &[WorkItem], to_items: &[WorkItem]) -> f64 {
    let given: f64 = from_items.iter().map(|i| i.difficulty).sum();
    let taken: f64 = to_items.iter().map(|i| i.difficulty).sum();
    let scale = 100.0 * from_items.len().max(to_items.len()).max(1) as f64;
    1.0 - ((given - taken).abs() / scale).min(1.0)
}

/// 接收方服务所接工作项区域的比例
pub fn regional_component(
    from: &Worker,
    to: &Worker,
    from_items: &[WorkItem],
    to_items: &[WorkItem],
) -> f64 {
    let total = from_items.len() + to_items.len();
    if total == 0 {
        return 1.0;
    }
    let served = from_items.iter().filter(|i| to.serves_zone(&i.zone)).count()
        + to_items.iter().filter(|i| from.serves_zone(&i.zone)).count();
    served as f64 / total as f64
}

/// 加权合成；没有历史时其权重按比例分给另外两项
pub fn combine(
    weights: &CompatibilityWeights,
    difficulty: f64,
    regional: f64,
    history: Option<f64>,
) -> f64 {
    let (mut weighted, mut total) = (
        weights.difficulty * difficulty + weights.regional * regional,
        weights.difficulty + weights.regional,
    );
    if let Some(history) = history {
        weighted += weights.history * history;
        total += weights.history;
    }
    if total <= 0.0 {
        return 0.0;
    }
    (weighted / total).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(id: &str, difficulty: f64, zone: &str) -> WorkItem {
        WorkItem::new(id, difficulty, 60, zone)
    }

    #[test]
    fn test_difficulty_component() {
        let heavy = [route("r-1", 80.0, "north")];
        let light = [route("r-2", 30.0, "north")];
        assert!((difficulty_component(&heavy, &light) - 0.5).abs() < 1e-12);
        assert_eq!(difficulty_component(&heavy, &heavy), 1.0);
        // 一对零：差值 80 / 100
        assert!((difficulty_component(&heavy, &[]) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_regional_component() {
        let a = Worker::new("a", 0, 5).with_zones(["north"]);
        let b = Worker::new("b", 0, 5).with_zones(["south"]);
        let from_items = [route("r-1", 10.0, "south")];
        let to_items = [route("r-2", 10.0, "east")];
        assert_eq!(regional_component(&a, &b, &from_items, &to_items), 0.5);
        assert_eq!(regional_component(&a, &b, &[], &[]), 1.0);
    }

    #[test]
    fn test_missing_history_redistributes_weight() {
        let weights = CompatibilityWeights::default();
        // 0.5 * 1.0 + 0.3 * 0.0 over 0.8
        assert!((combine(&weights, 1.0, 0.0, None) - 0.625).abs() < 1e-12);
        // 0.5 + 0 + 0.2 * 1.0 over 1.0
        assert!((combine(&weights, 1.0, 0.0, Some(1.0)) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_history_satisfaction() {
        assert_eq!(SwapHistory::default().satisfaction(), None);
        let history = SwapHistory {
            accepted: 3,
            declined: 1,
        };
        assert_eq!(history.satisfaction(), Some(0.75));
    }
}
