use chrono::{Duration, Utc};

use fairshare_domain::*;
use fairshare_infrastructure::{DatabaseManager, SqliteAuditRepository};

async fn repository() -> FairshareResult<SqliteAuditRepository> {
    let manager = DatabaseManager::new("sqlite::memory:", 1).await?;
    manager.migrate().await?;
    manager.health_check().await?;
    Ok(SqliteAuditRepository::new(manager.pool().clone()))
}

#[tokio::test]
async fn test_sqlite_audit_round_trip() -> FairshareResult<()> {
    let repo = repository().await?;
    let now = Utc::now();
    let entry = AuditEntry::new(AuditActor::Scheduler, AuditAction::BaselinePublished, "baseline:1", now)
        .with_reason("批量优化完成")
        .with_fairness(FairnessDelta {
            gini_before: 0.3,
            gini_after: 0.1,
            variance_before: 40.0,
            variance_after: 5.0,
        })
        .with_details(serde_json::json!({"churn": 3}))
        .flagged();

    let stored = repo.append(entry.clone()).await?;
    assert_eq!(stored.sequence, 1);

    let page = repo.query_page(&AuditFilter::default(), None, 10).await?;
    assert_eq!(page.entries.len(), 1);
    let loaded = &page.entries[0];
    assert_eq!(loaded.actor, AuditActor::Scheduler);
    assert_eq!(loaded.action, AuditAction::BaselinePublished);
    assert_eq!(loaded.reason, "批量优化完成");
    assert_eq!(loaded.fairness, entry.fairness);
    assert_eq!(loaded.details["churn"], 3);
    assert!(loaded.flagged);
    assert_eq!(
        loaded.timestamp.timestamp_micros(),
        entry.timestamp.timestamp_micros()
    );
    Ok(())
}

#[tokio::test]
async fn test_sqlite_audit_filters_and_cursor() -> FairshareResult<()> {
    let repo = repository().await?;
    let start = Utc::now();
    for i in 0..6 {
        let actor = if i < 3 {
            AuditActor::worker("d-1")
        } else {
            AuditActor::Marketplace
        };
        repo.append(AuditEntry::new(
            actor,
            AuditAction::SwapExpired,
            format!("proposal:{i}"),
            start + Duration::seconds(i),
        ))
        .await?;
    }

    let by_actor = AuditFilter {
        actor: Some(AuditActor::Marketplace),
        ..AuditFilter::default()
    };
    let first = repo.query_page(&by_actor, None, 2).await?;
    assert_eq!(
        first.entries.iter().map(|e| e.sequence).collect::<Vec<_>>(),
        vec![4, 5]
    );
    let rest = repo.query_page(&by_actor, first.next_cursor, 2).await?;
    assert_eq!(rest.entries.len(), 1);
    assert!(rest.next_cursor.is_none());

    let window = AuditFilter {
        from: Some(start + Duration::seconds(1)),
        until: Some(start + Duration::seconds(2)),
        ..AuditFilter::default()
    };
    assert_eq!(repo.query_page(&window, None, 10).await?.entries.len(), 2);

    let by_subject = AuditFilter {
        subject: Some("proposal:5".to_string()),
        ..AuditFilter::default()
    };
    assert_eq!(repo.query_page(&by_subject, None, 10).await?.entries[0].sequence, 6);
    Ok(())
}
