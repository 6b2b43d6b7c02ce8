//! Test data builders
//!
//! 默认值足够组成一个可行的小规模场景，按需覆盖字段。

use fairshare_domain::{Availability, WorkItem, Worker};

pub struct WorkerBuilder {
    worker: Worker,
}

impl WorkerBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            worker: Worker::new(id, 0, 10),
        }
    }

    pub fn with_capacity(mut self, min: u32, max: u32) -> Self {
        self.worker.capacity_min = min;
        self.worker.capacity_max = max;
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.worker.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_zones(mut self, zones: &[&str]) -> Self {
        self.worker.zones = zones.iter().map(|z| z.to_string()).collect();
        self
    }

    pub fn with_historical_load(mut self, load: f64) -> Self {
        self.worker.historical_load = load;
        self
    }

    pub fn suspended(mut self) -> Self {
        self.worker.availability = Availability::Suspended;
        self
    }

    pub fn build(self) -> Worker {
        self.worker
    }
}

pub struct WorkItemBuilder {
    item: WorkItem,
}

impl WorkItemBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            item: WorkItem::new(id, 50.0, 60, "central"),
        }
    }

    pub fn with_difficulty(mut self, difficulty: f64) -> Self {
        self.item.difficulty = difficulty;
        self
    }

    pub fn with_minutes(mut self, minutes: u32) -> Self {
        self.item.estimated_minutes = minutes;
        self
    }

    pub fn with_zone(mut self, zone: &str) -> Self {
        self.item.zone = zone.to_string();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.item.required_tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn build(self) -> WorkItem {
        self.item
    }
}

/// `d-1..=d-n`，容量相同
pub fn fleet(n: usize, min: u32, max: u32) -> Vec<Worker> {
    (1..=n)
        .map(|i| {
            WorkerBuilder::new(&format!("d-{i}"))
                .with_capacity(min, max)
                .build()
        })
        .collect()
}

/// `r-01..`，难度相同
pub fn uniform_routes(n: usize, difficulty: f64) -> Vec<WorkItem> {
    (1..=n)
        .map(|i| {
            WorkItemBuilder::new(&format!("r-{i:02}"))
                .with_difficulty(difficulty)
                .build()
        })
        .collect()
}

/// 按给定难度列表生成路线
pub fn routes_with_difficulty(difficulties: &[f64]) -> Vec<WorkItem> {
    difficulties
        .iter()
        .enumerate()
        .map(|(i, d)| {
            WorkItemBuilder::new(&format!("r-{:02}", i + 1))
                .with_difficulty(*d)
                .build()
        })
        .collect()
}
