//! 上游数据源
//!
//! 工作项与Worker名册以JSON数组文件提供，启动时整体载入。

use std::collections::BTreeSet;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::info;

use fairshare_config::FeedConfig;
use fairshare_domain::{WorkItem, Worker};
use fairshare_errors::{FairshareError, FairshareResult};

/// 一次载入的完整数据
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feed {
    pub workers: Vec<Worker>,
    pub items: Vec<WorkItem>,
}

pub struct FeedLoader;

impl FeedLoader {
    /// 按配置载入；未配置的数据源返回空集合
    pub async fn load(config: &FeedConfig) -> FairshareResult<Feed> {
        let workers = match &config.workers_path {
            Some(path) => Self::load_workers(path).await?,
            None => Vec::new(),
        };
        let items = match &config.work_items_path {
            Some(path) => Self::load_work_items(path).await?,
            None => Vec::new(),
        };
        Ok(Feed { workers, items })
    }

    pub async fn load_work_items<P: AsRef<Path>>(path: P) -> FairshareResult<Vec<WorkItem>> {
        let items: Vec<WorkItem> = Self::read_json(path.as_ref()).await?;
        for item in &items {
            item.validate()?;
        }
        Self::ensure_unique(items.iter().map(|i| i.id.as_str()), "工作项")?;
        info!("从 {} 载入 {} 个工作项", path.as_ref().display(), items.len());
        Ok(items)
    }

    pub async fn load_workers<P: AsRef<Path>>(path: P) -> FairshareResult<Vec<Worker>> {
        let workers: Vec<Worker> = Self::read_json(path.as_ref()).await?;
        for worker in &workers {
            worker.validate()?;
        }
        Self::ensure_unique(workers.iter().map(|w| w.id.as_str()), "Worker")?;
        info!("从 {} 载入 {} 名Worker", path.as_ref().display(), workers.len());
        Ok(workers)
    }

    pub fn parse_work_items(raw: &str) -> FairshareResult<Vec<WorkItem>> {
        let items: Vec<WorkItem> = serde_json::from_str(raw)
            .map_err(|e| FairshareError::validation_error(format!("工作项数据格式错误: {e}")))?;
        for item in &items {
            item.validate()?;
        }
        Self::ensure_unique(items.iter().map(|i| i.id.as_str()), "工作项")?;
        Ok(items)
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> FairshareResult<T> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            FairshareError::config_error(format!("读取数据文件 {} 失败: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            FairshareError::validation_error(format!("数据文件 {} 格式错误: {e}", path.display()))
        })
    }

    fn ensure_unique<'a, I>(ids: I, label: &str) -> FairshareResult<()>
    where
        I: Iterator<Item = &'a str>,
    {
        let mut seen = BTreeSet::new();
        for id in ids {
            if !seen.insert(id) {
                return Err(FairshareError::validation_error(format!(
                    "{label} {id} 重复"
                )));
            }
        }
        Ok(())
    }
}
