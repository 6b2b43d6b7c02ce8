use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::{debug, warn};

use fairshare_domain::{FairshareError, FairshareResult};

/// 批量优化的CRON触发计划
pub struct OptimizationSchedule {
    expression: String,
    schedule: Schedule,
}

impl OptimizationSchedule {
    pub fn new(cron_expr: &str) -> FairshareResult<Self> {
        let schedule = Self::parse(cron_expr)?;
        Ok(Self {
            expression: cron_expr.to_string(),
            schedule,
        })
    }

    fn parse(cron_expr: &str) -> FairshareResult<Schedule> {
        Schedule::from_str(cron_expr).map_err(|e| {
            FairshareError::config_error(format!("无效的CRON表达式 '{cron_expr}': {e}"))
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// `last_check` 之后、`now` 之前（含）是否存在计划触发点
    pub fn should_trigger(&self, last_check: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        // 从未检查过时回看一分钟
        let from = last_check.unwrap_or(now - Duration::minutes(1));
        match self.schedule.after(&from).next() {
            Some(next_time) => {
                let due = next_time <= now;
                if due {
                    debug!(
                        "批量优化到达触发点: 上次检查={}, 触发点={}, 当前时间={}",
                        from.format("%Y-%m-%d %H:%M:%S UTC"),
                        next_time.format("%Y-%m-%d %H:%M:%S UTC"),
                        now.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
                due
            }
            None => {
                warn!("无法计算下一次触发时间: {}", self.expression);
                false
            }
        }
    }

    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    pub fn validate_cron_expression(cron_expr: &str) -> FairshareResult<()> {
        Self::parse(cron_expr).map(|_| ())
    }

    pub fn time_until_next_execution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_execution_time(now).map(|next| next - now)
    }

    /// 上次运行之后的计划触发点已过去超过宽限期
    pub fn is_run_overdue(
        &self,
        last_run: DateTime<Utc>,
        now: DateTime<Utc>,
        grace_period_minutes: i64,
    ) -> bool {
        self.next_execution_time(last_run)
            .map(|expected| now > expected + Duration::minutes(grace_period_minutes))
            .unwrap_or(false)
    }
}
