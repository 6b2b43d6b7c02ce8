use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use fairshare_domain::Constraint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    engine::{FairnessConfig, MarketplaceConfig, SchedulerConfig, SolverConfig},
    storage::{FeedConfig, StorageConfig},
};
use crate::validation::ConfigValidator;

pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/fairshare.toml",
    "fairshare.toml",
    "/etc/fairshare/config.toml",
];

fn default_constraints() -> Vec<Constraint> {
    Constraint::default_set()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub solver: SolverConfig,
    pub scheduler: SchedulerConfig,
    pub marketplace: MarketplaceConfig,
    pub fairness: FairnessConfig,
    #[serde(default = "default_constraints")]
    pub constraints: Vec<Constraint>,
    pub storage: StorageConfig,
    pub feeds: FeedConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            scheduler: SchedulerConfig::default(),
            marketplace: MarketplaceConfig::default(),
            fairness: FairnessConfig::default(),
            constraints: default_constraints(),
            storage: StorageConfig::default(),
            feeds: FeedConfig::default(),
            api: ApiConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        // FAIRSHARE_MARKETPLACE__FAIRNESS_TOLERANCE=0.2 覆盖 marketplace.fairness_tolerance
        builder = builder.add_source(
            Environment::with_prefix("FAIRSHARE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    fn validate_constraints(&self) -> crate::ConfigResult<()> {
        let mut names = BTreeSet::new();
        for constraint in &self.constraints {
            constraint
                .validate()
                .map_err(|e| crate::ConfigError::Validation(e.to_string()))?;
            if !names.insert(constraint.name.as_str()) {
                return Err(crate::ConfigError::Validation(format!(
                    "duplicate constraint name: {}",
                    constraint.name
                )));
            }
        }
        Ok(())
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.solver.validate()?;
        self.scheduler.validate()?;
        self.marketplace.validate()?;
        self.fairness.validate()?;
        self.validate_constraints()?;
        self.storage.validate()?;
        self.feeds.validate()?;
        self.api.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}
