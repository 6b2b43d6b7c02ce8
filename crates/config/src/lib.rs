//! 公平分配引擎的配置
//!
//! 配置按 默认值 → TOML文件 → `FAIRSHARE_` 环境变量 的顺序叠加，
//! 载入后整体校验，任何一段不合法都拒绝启动。

pub mod models;
pub mod validation;

pub use models::{
    ApiConfig, AppConfig, AuditBackend, CompatibilityWeights, FairnessConfig, FeedConfig,
    LogFormat, MarketplaceConfig, ObservabilityConfig, SchedulerConfig, SolverConfig,
    StorageConfig, DEFAULT_CONFIG_PATHS,
};
pub use validation::{ConfigValidator, ValidationUtils};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}
