use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use fairshare_errors::{FairshareError, FairshareResult};

use crate::value_objects::LoadMetric;

pub const MIN_DIFFICULTY: f64 = 0.0;
pub const MAX_DIFFICULTY: f64 = 100.0;

/// 工作项（配送路线），在一个规划周期内不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    /// 难度分，0-100，由上游评分模型给出
    pub difficulty: f64,
    /// 预计耗时（分钟）
    pub estimated_minutes: u32,
    pub zone: String,
    #[serde(default)]
    pub required_tags: BTreeSet<String>,
}

impl WorkItem {
    pub fn new<I: Into<String>, Z: Into<String>>(
        id: I,
        difficulty: f64,
        estimated_minutes: u32,
        zone: Z,
    ) -> Self {
        Self {
            id: id.into(),
            difficulty,
            estimated_minutes,
            zone: zone.into(),
            required_tags: BTreeSet::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// 该工作项在给定口径下贡献的负载
    pub fn load(&self, metric: LoadMetric) -> f64 {
        match metric {
            LoadMetric::Difficulty => self.difficulty,
            LoadMetric::Count => 1.0,
            LoadMetric::Duration => self.estimated_minutes as f64,
        }
    }

    pub fn validate(&self) -> FairshareResult<()> {
        if self.id.trim().is_empty() {
            return Err(FairshareError::validation_error("工作项ID不能为空"));
        }
        if !self.difficulty.is_finite()
            || self.difficulty < MIN_DIFFICULTY
            || self.difficulty > MAX_DIFFICULTY
        {
            return Err(FairshareError::validation_error(format!(
                "工作项 {} 的难度 {} 超出范围 [0, 100]",
                self.id, self.difficulty
            )));
        }
        Ok(())
    }
}

/// Worker可用状态，由健康/疲劳子系统外部设置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    Available,
    Suspended,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Available => "available",
            Availability::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Availability {
    type Err = FairshareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(Availability::Available),
            "suspended" => Ok(Availability::Suspended),
            _ => Err(FairshareError::validation_error(format!(
                "无效的可用状态: {s}"
            ))),
        }
    }
}

/// Worker（司机），跨规划周期存在
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    /// 每个周期最少分配的工作项数
    pub capacity_min: u32,
    /// 每个周期最多分配的工作项数
    pub capacity_max: u32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// 可服务的区域，为空表示不限
    #[serde(default)]
    pub zones: BTreeSet<String>,
    #[serde(default)]
    pub availability: Availability,
    /// 历史周期累计负载
    #[serde(default)]
    pub historical_load: f64,
}

impl Worker {
    pub fn new<I: Into<String>>(id: I, capacity_min: u32, capacity_max: u32) -> Self {
        Self {
            id: id.into(),
            capacity_min,
            capacity_max,
            tags: BTreeSet::new(),
            zones: BTreeSet::new(),
            availability: Availability::Available,
            historical_load: 0.0,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_zones<I, S>(mut self, zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.zones = zones.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_available(&self) -> bool {
        matches!(self.availability, Availability::Available)
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self.availability, Availability::Suspended)
    }

    /// 具备工作项要求的全部资质标签
    pub fn has_tags_for(&self, item: &WorkItem) -> bool {
        item.required_tags.is_subset(&self.tags)
    }

    pub fn serves_zone(&self, zone: &str) -> bool {
        self.zones.is_empty() || self.zones.contains(zone)
    }

    pub fn within_capacity(&self, count: usize) -> bool {
        count >= self.capacity_min as usize && count <= self.capacity_max as usize
    }

    pub fn validate(&self) -> FairshareResult<()> {
        if self.id.trim().is_empty() {
            return Err(FairshareError::validation_error("Worker ID不能为空"));
        }
        if self.capacity_min > self.capacity_max {
            return Err(FairshareError::validation_error(format!(
                "Worker {} 的容量下限 {} 大于上限 {}",
                self.id, self.capacity_min, self.capacity_max
            )));
        }
        if !self.historical_load.is_finite() || self.historical_load < 0.0 {
            return Err(FairshareError::validation_error(format!(
                "Worker {} 的历史负载无效: {}",
                self.id, self.historical_load
            )));
        }
        Ok(())
    }

    pub fn entity_description(&self) -> String {
        format!(
            "Worker '{}' (容量: {}-{}, 状态: {})",
            self.id, self.capacity_min, self.capacity_max, self.availability
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_item_validation() {
        assert!(WorkItem::new("r-1", 50.0, 30, "north").validate().is_ok());
        assert!(WorkItem::new("r-1", 0.0, 30, "north").validate().is_ok());
        assert!(WorkItem::new("r-1", 100.0, 30, "north").validate().is_ok());
        assert!(WorkItem::new("r-1", 100.5, 30, "north").validate().is_err());
        assert!(WorkItem::new("r-1", -1.0, 30, "north").validate().is_err());
        assert!(WorkItem::new("r-1", f64::NAN, 30, "north").validate().is_err());
        assert!(WorkItem::new(" ", 10.0, 30, "north").validate().is_err());
    }

    #[test]
    fn test_work_item_load_metrics() {
        let item = WorkItem::new("r-1", 42.0, 95, "north");
        assert_eq!(item.load(LoadMetric::Difficulty), 42.0);
        assert_eq!(item.load(LoadMetric::Count), 1.0);
        assert_eq!(item.load(LoadMetric::Duration), 95.0);
    }

    #[test]
    fn test_worker_eligibility() {
        let worker = Worker::new("d-1", 0, 5)
            .with_tags(["hazmat", "van"])
            .with_zones(["north"]);
        let plain = WorkItem::new("r-1", 10.0, 30, "north");
        let hazmat = WorkItem::new("r-2", 10.0, 30, "south").with_tags(["hazmat"]);
        let reefer = WorkItem::new("r-3", 10.0, 30, "north").with_tags(["reefer"]);

        assert!(worker.has_tags_for(&plain));
        assert!(worker.has_tags_for(&hazmat));
        assert!(!worker.has_tags_for(&reefer));
        assert!(worker.serves_zone("north"));
        assert!(!worker.serves_zone("south"));
        assert!(Worker::new("d-2", 0, 5).serves_zone("anywhere"));
    }

    #[test]
    fn test_worker_capacity_and_validation() {
        let worker = Worker::new("d-1", 2, 4);
        assert!(!worker.within_capacity(1));
        assert!(worker.within_capacity(2));
        assert!(worker.within_capacity(4));
        assert!(!worker.within_capacity(5));

        assert!(worker.validate().is_ok());
        assert!(Worker::new("d-1", 5, 4).validate().is_err());
    }

    #[test]
    fn test_availability_parsing() {
        assert_eq!("suspended".parse::<Availability>().unwrap(), Availability::Suspended);
        assert_eq!("Available".parse::<Availability>().unwrap(), Availability::Available);
        assert!("sleeping".parse::<Availability>().is_err());

        let json = serde_json::to_string(&Availability::Suspended).unwrap();
        assert_eq!(json, "\"suspended\"");
    }
}
