use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use fairshare_config::StorageConfig;
use fairshare_errors::FairshareResult;

const AUDIT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audit_entries (
    sequence INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp_us INTEGER NOT NULL,
    actor TEXT NOT NULL,
    action TEXT NOT NULL,
    subject TEXT NOT NULL,
    fairness TEXT,
    reason TEXT NOT NULL,
    flagged INTEGER NOT NULL DEFAULT 0,
    details TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_entries_subject ON audit_entries(subject);
CREATE INDEX IF NOT EXISTS idx_audit_entries_action ON audit_entries(action);
"#;

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(url: &str, max_connections: u32) -> FairshareResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        info!("已连接审计数据库: {}", url);
        Ok(Self { pool })
    }

    pub async fn from_config(config: &StorageConfig) -> FairshareResult<Self> {
        Self::new(&config.sqlite_url, config.max_connections).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> FairshareResult<()> {
        sqlx::raw_sql(AUDIT_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> FairshareResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
