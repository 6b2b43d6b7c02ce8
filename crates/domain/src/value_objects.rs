use serde::{Deserialize, Serialize};

use fairshare_errors::FairshareError;

/// 每个Worker负载标量的计算口径
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMetric {
    /// 工作项难度之和
    #[default]
    Difficulty,
    /// 工作项数量
    Count,
    /// 预计耗时之和（分钟）
    Duration,
}

impl std::str::FromStr for LoadMetric {
    type Err = FairshareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "difficulty" => Ok(LoadMetric::Difficulty),
            "count" => Ok(LoadMetric::Count),
            "duration" => Ok(LoadMetric::Duration),
            _ => Err(FairshareError::validation_error(format!(
                "无效的负载口径: {s}. 可选: difficulty, count, duration"
            ))),
        }
    }
}

/// 一次换班中单个工作项的归属变化
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemMove {
    pub item_id: String,
    pub from_worker: String,
    pub to_worker: String,
}

impl ItemMove {
    pub fn new<I, F, T>(item_id: I, from_worker: F, to_worker: T) -> Self
    where
        I: Into<String>,
        F: Into<String>,
        T: Into<String>,
    {
        Self {
            item_id: item_id.into(),
            from_worker: from_worker.into(),
            to_worker: to_worker.into(),
        }
    }
}

/// 公平性历史上的一个点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessHistoryPoint {
    pub version: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub gini: f64,
    pub variance: f64,
    pub underserved_count: usize,
    pub overserved_count: usize,
}
