use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub name: String,
    pub severity: AlertSeverity,
    pub message: String,
    /// 例如导致不可行的约束名
    pub labels: Vec<(String, String)>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new<N: Into<String>, M: Into<String>>(
        name: N,
        severity: AlertSeverity,
        message: M,
    ) -> Self {
        Self {
            name: name.into(),
            severity,
            message: message.into(),
            labels: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }
}

/// 告警出口，由外部告警系统实现
pub trait AlertChannel: Send + Sync {
    fn send_alert(&self, alert: Alert) -> Result<()>;
}

pub struct LogAlertChannel {
    name: String,
}

impl LogAlertChannel {
    pub fn new(name: String) -> Self {
        Self { name }
    }
}

impl AlertChannel for LogAlertChannel {
    fn send_alert(&self, alert: Alert) -> Result<()> {
        match alert.severity {
            AlertSeverity::Error | AlertSeverity::Critical => error!(
                channel = %self.name,
                alert.name = %alert.name,
                alert.severity = ?alert.severity,
                alert.labels = ?alert.labels,
                message = %alert.message,
                "Alert notification sent"
            ),
            _ => warn!(
                channel = %self.name,
                alert.name = %alert.name,
                alert.severity = ?alert.severity,
                alert.labels = ?alert.labels,
                message = %alert.message,
                "Alert notification sent"
            ),
        }
        Ok(())
    }
}
