use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use fairshare_domain::FairshareResult;

use crate::marketplace::SwapMarketplace;

/// 定期把到期的换班提议标记为 expired
pub struct ExpirySweeper {
    marketplace: Arc<SwapMarketplace>,
    interval: Duration,
    running: Arc<tokio::sync::RwLock<bool>>,
}

impl ExpirySweeper {
    pub fn new(marketplace: Arc<SwapMarketplace>, interval: Duration) -> Self {
        Self {
            marketplace,
            interval,
            running: Arc::new(tokio::sync::RwLock::new(false)),
        }
    }

    pub fn from_marketplace(marketplace: Arc<SwapMarketplace>) -> Self {
        let interval = Duration::from_secs(marketplace.config().sweep_interval_seconds.max(1));
        Self::new(marketplace, interval)
    }

    pub async fn start(&self) -> FairshareResult<()> {
        {
            let mut running = self.running.write().await;
            *running = true;
        }
        info!("启动换班提议过期清理，间隔 {:?}", self.interval);
        self.sweep_loop().await;
        Ok(())
    }

    pub async fn stop(&self) {
        info!("停止换班提议过期清理");
        let mut running = self.running.write().await;
        *running = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// 执行一次清理
    pub async fn sweep_once(&self) -> FairshareResult<usize> {
        self.marketplace.expire_stale().await
    }

    async fn sweep_loop(&self) {
        loop {
            if !*self.running.read().await {
                info!("收到停止信号，退出过期清理循环");
                break;
            }

            match self.sweep_once().await {
                Ok(0) => debug!("没有到期的换班提议"),
                Ok(count) => debug!("本轮清理 {} 个到期提议", count),
                Err(e) => error!("清理到期提议失败: {}", e),
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
