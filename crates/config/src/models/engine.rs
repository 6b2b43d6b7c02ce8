use fairshare_domain::LoadMetric;
use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

/// 求解器参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    /// 目标函数中Gini系数的权重
    pub gini_weight: f64,
    /// 目标函数中软约束惩罚总和的权重
    pub penalty_weight: f64,
    /// 每次局部搜索的最大改进轮数
    pub max_iterations: usize,
    /// 随机扰动重启次数
    pub restarts: usize,
    /// 随机数种子，相同输入 + 相同种子得到相同结果
    pub seed: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            gini_weight: 1.0,
            penalty_weight: 0.05,
            max_iterations: 500,
            restarts: 4,
            seed: 42,
        }
    }
}

impl ConfigValidator for SolverConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_weight(self.gini_weight, "solver.gini_weight")?;
        ValidationUtils::validate_weight(self.penalty_weight, "solver.penalty_weight")?;
        ValidationUtils::validate_count(self.max_iterations, "solver.max_iterations", 100_000)?;
        if self.restarts > 64 {
            return Err(crate::ConfigError::Validation(
                "solver.restarts must be less than or equal to 64".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 六段式cron表达式（含秒）
    pub cron: String,
    pub tick_interval_seconds: u64,
    /// 单次优化的默认超时
    pub run_timeout_seconds: u64,
    /// 容量不可行时放宽容量约束并记录审计
    pub allow_capacity_override: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: "0 0 2 * * *".to_string(),
            tick_interval_seconds: 30,
            run_timeout_seconds: 120,
            allow_capacity_override: false,
        }
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.cron, "scheduler.cron")?;
        if self.cron.split_whitespace().count() < 6 {
            return Err(crate::ConfigError::Validation(format!(
                "scheduler.cron must have at least 6 fields (sec min hour day month weekday): {}",
                self.cron
            )));
        }
        ValidationUtils::validate_timeout_seconds(
            self.tick_interval_seconds,
            "scheduler.tick_interval_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.run_timeout_seconds,
            "scheduler.run_timeout_seconds",
        )?;
        Ok(())
    }
}

/// 兼容度各分项权重
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompatibilityWeights {
    pub difficulty: f64,
    pub regional: f64,
    pub history: f64,
}

impl Default for CompatibilityWeights {
    fn default() -> Self {
        Self {
            difficulty: 0.5,
            regional: 0.3,
            history: 0.2,
        }
    }
}

impl ConfigValidator for CompatibilityWeights {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_weight(self.difficulty, "marketplace.compatibility.difficulty")?;
        ValidationUtils::validate_weight(self.regional, "marketplace.compatibility.regional")?;
        ValidationUtils::validate_weight(self.history, "marketplace.compatibility.history")?;
        if self.difficulty + self.regional + self.history <= 0.0 {
            return Err(crate::ConfigError::Validation(
                "marketplace.compatibility weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketplaceConfig {
    /// 相对基线Gini允许的最大增幅，0.10 即 10%
    pub fairness_tolerance: f64,
    pub proposal_ttl_minutes: i64,
    pub sweep_interval_seconds: u64,
    /// 答复换班的默认超时
    pub response_timeout_seconds: u64,
    pub max_suggestions: usize,
    pub compatibility: CompatibilityWeights,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            fairness_tolerance: 0.10,
            proposal_ttl_minutes: 60,
            sweep_interval_seconds: 30,
            response_timeout_seconds: 10,
            max_suggestions: 5,
            compatibility: CompatibilityWeights::default(),
        }
    }
}

impl ConfigValidator for MarketplaceConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_ratio(self.fairness_tolerance, "marketplace.fairness_tolerance")?;
        if self.proposal_ttl_minutes <= 0 {
            return Err(crate::ConfigError::Validation(
                "marketplace.proposal_ttl_minutes must be greater than 0".to_string(),
            ));
        }
        ValidationUtils::validate_timeout_seconds(
            self.sweep_interval_seconds,
            "marketplace.sweep_interval_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.response_timeout_seconds,
            "marketplace.response_timeout_seconds",
        )?;
        ValidationUtils::validate_count(self.max_suggestions, "marketplace.max_suggestions", 100)?;
        self.compatibility.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FairnessConfig {
    pub load_metric: LoadMetric,
    /// 低于均值 (1 - band) 为负载不足，高于 (1 + band) 为负载过重
    pub imbalance_band: f64,
    /// Worker历史负载计入当前负载的比例
    pub history_weight: f64,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            load_metric: LoadMetric::Difficulty,
            imbalance_band: 0.15,
            history_weight: 0.0,
        }
    }
}

impl ConfigValidator for FairnessConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_ratio(self.imbalance_band, "fairness.imbalance_band")?;
        ValidationUtils::validate_ratio(self.history_weight, "fairness.history_weight")?;
        Ok(())
    }
}
