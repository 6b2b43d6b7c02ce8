use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use fairshare_domain::{
    AuditAction, AuditActor, AuditEntry, AuditFilter, AuditPage, AuditRepository, FairnessDelta,
};
use fairshare_errors::{FairshareError, FairshareResult};

use crate::memory::audit_repository::page_of;

/// SQLite审计日志。序号由 AUTOINCREMENT 主键分配，只增不复用。
pub struct SqliteAuditRepository {
    pool: SqlitePool,
}

impl SqliteAuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> FairshareResult<AuditEntry> {
        let sequence: i64 = row.try_get("sequence")?;
        let timestamp_us: i64 = row.try_get("timestamp_us")?;
        let actor: String = row.try_get("actor")?;
        let action: String = row.try_get("action")?;
        let fairness: Option<String> = row.try_get("fairness")?;
        let details: String = row.try_get("details")?;
        let flagged: bool = row.try_get("flagged")?;

        let timestamp = DateTime::from_timestamp_micros(timestamp_us).ok_or_else(|| {
            FairshareError::persistence(format!("审计记录 {sequence} 的时间戳无效"))
        })?;
        let fairness: Option<FairnessDelta> = match fairness {
            Some(raw) => serde_json::from_str(&raw)?,
            None => None,
        };

        Ok(AuditEntry {
            sequence: sequence as u64,
            timestamp,
            actor: actor.parse::<AuditActor>()?,
            action: action.parse::<AuditAction>()?,
            subject: row.try_get("subject")?,
            fairness,
            reason: row.try_get("reason")?,
            flagged,
            details: serde_json::from_str(&details)?,
        })
    }
}

#[async_trait]
impl AuditRepository for SqliteAuditRepository {
    async fn append(&self, mut entry: AuditEntry) -> FairshareResult<AuditEntry> {
        let fairness = entry.fairness.map(|f| serde_json::to_string(&f)).transpose()?;
        let details = serde_json::to_string(&entry.details)?;

        let result = sqlx::query(
            r#"
            INSERT INTO audit_entries (timestamp_us, actor, action, subject, fairness, reason, flagged, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.timestamp.timestamp_micros())
        .bind(entry.actor.to_string())
        .bind(entry.action.as_str())
        .bind(&entry.subject)
        .bind(fairness)
        .bind(&entry.reason)
        .bind(entry.flagged)
        .bind(details)
        .execute(&self.pool)
        .await?;

        entry.sequence = result.last_insert_rowid() as u64;
        debug!("审计记录已写入: {} {}", entry.sequence, entry.action);
        Ok(entry)
    }

    async fn query_page(
        &self,
        filter: &AuditFilter,
        after: Option<u64>,
        limit: usize,
    ) -> FairshareResult<AuditPage> {
        let limit = limit.max(1);
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT sequence, timestamp_us, actor, action, subject, fairness, reason, flagged, details \
             FROM audit_entries WHERE sequence > ",
        );
        builder.push_bind(after.unwrap_or(0) as i64);
        if let Some(actor) = &filter.actor {
            builder.push(" AND actor = ").push_bind(actor.to_string());
        }
        if let Some(action) = filter.action {
            builder.push(" AND action = ").push_bind(action.as_str());
        }
        if let Some(subject) = &filter.subject {
            builder.push(" AND subject = ").push_bind(subject.clone());
        }
        if let Some(from) = filter.from {
            builder
                .push(" AND timestamp_us >= ")
                .push_bind(from.timestamp_micros());
        }
        if let Some(until) = filter.until {
            builder
                .push(" AND timestamp_us <= ")
                .push_bind(until.timestamp_micros());
        }
        builder
            .push(" ORDER BY sequence ASC LIMIT ")
            .push_bind((limit + 1) as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let entries = rows
            .iter()
            .map(Self::row_to_entry)
            .collect::<FairshareResult<Vec<_>>>()?;
        Ok(page_of(entries.into_iter(), limit))
    }
}
