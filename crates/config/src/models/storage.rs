use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub audit_backend: AuditBackend,
    pub sqlite_url: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            audit_backend: AuditBackend::Memory,
            sqlite_url: "sqlite://fairshare-audit.db?mode=rwc".to_string(),
            max_connections: 1,
        }
    }
}

impl ConfigValidator for StorageConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.audit_backend == AuditBackend::Sqlite {
            ValidationUtils::validate_not_empty(&self.sqlite_url, "storage.sqlite_url")?;
            if !self.sqlite_url.starts_with("sqlite:") {
                return Err(crate::ConfigError::Validation(format!(
                    "storage.sqlite_url must start with sqlite: {}",
                    self.sqlite_url
                )));
            }
        }
        ValidationUtils::validate_count(
            self.max_connections as usize,
            "storage.max_connections",
            64,
        )?;
        Ok(())
    }
}

/// 上游数据源，未配置时以空集合启动
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct FeedConfig {
    pub work_items_path: Option<String>,
    pub workers_path: Option<String>,
}

impl ConfigValidator for FeedConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if let Some(path) = &self.work_items_path {
            ValidationUtils::validate_not_empty(path, "feeds.work_items_path")?;
        }
        if let Some(path) = &self.workers_path {
            ValidationUtils::validate_not_empty(path, "feeds.workers_path")?;
        }
        Ok(())
    }
}
