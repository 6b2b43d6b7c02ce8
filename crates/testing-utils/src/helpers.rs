//! Test helper utilities

use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::time::sleep;

use fairshare_domain::Clock;

pub struct TestEnv;

impl TestEnv {
    /// 轮询直到条件成立或超时
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

/// 手动推进的时钟
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).single().unwrap_or_else(Utc::now))
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.advance(chrono::Duration::minutes(61));
        assert_eq!(clock.now() - start, chrono::Duration::minutes(61));
    }

    #[tokio::test]
    async fn test_wait_for() {
        assert!(TestEnv::wait_for(|| async { true }, Duration::from_millis(50)).await);
        assert!(!TestEnv::wait_for(|| async { false }, Duration::from_millis(50)).await);
    }
}
