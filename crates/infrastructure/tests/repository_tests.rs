use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use futures::TryStreamExt;
use uuid::Uuid;

use fairshare_domain::*;
use fairshare_infrastructure::{
    InMemoryAuditRepository, InMemoryBaselineRepository, InMemoryProposalRepository,
    InMemoryRosterRepository,
};

fn assignment(version: u64) -> Assignment {
    let mut placements = BTreeMap::new();
    placements.insert("r-1".to_string(), "d-1".to_string());
    Assignment {
        version,
        created_at: Utc::now() + Duration::minutes(version as i64),
        origin: AssignmentOrigin::Optimization,
        placements,
        snapshot: FairnessSnapshot::default(),
        reference_gini: 0.0,
        reference_version: version,
        constraint_report: EvaluationReport::default(),
    }
}

fn proposal(from: &str, to: &str, item: &str) -> SwapProposal {
    let now = Utc::now();
    SwapProposal {
        id: Uuid::new_v4(),
        from_worker: from.to_string(),
        to_worker: to.to_string(),
        from_items: vec![item.to_string()],
        to_items: vec![],
        compatibility: 0.5,
        reason: String::new(),
        origin: ProposalOrigin::Worker,
        state: ProposalState::Pending,
        rejection: None,
        baseline_version: 1,
        created_at: now,
        expires_at: now + Duration::minutes(60),
        resolved_at: None,
        resolved_by: None,
    }
}

#[tokio::test]
async fn test_baseline_versions_are_append_only() -> FairshareResult<()> {
    let repo = InMemoryBaselineRepository::new();
    assert!(repo.current().await?.is_none());

    repo.append(assignment(1)).await?;
    repo.append(assignment(2)).await?;
    assert_eq!(repo.current().await?.map(|a| a.version), Some(2));
    assert_eq!(repo.get(1).await?.map(|a| a.version), Some(1));
    assert!(repo.get(0).await?.is_none());

    // 跳号或重复版本都被拒绝
    let err = repo.append(assignment(2)).await.unwrap_err();
    assert!(matches!(err, FairshareError::Conflict(_)));
    assert!(repo.append(assignment(4)).await.is_err());
    assert_eq!(repo.len().await, 2);

    let all = repo.history(None, None).await?;
    assert_eq!(all.len(), 2);
    let later = repo.history(Some(all[1].created_at), None).await?;
    assert_eq!(later.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_roster_validation_and_availability() -> FairshareResult<()> {
    let repo = InMemoryRosterRepository::new();
    assert_eq!(repo.list_constraints().await?.len(), 4);

    repo.upsert_worker(&Worker::new("d-2", 0, 5)).await?;
    repo.upsert_worker(&Worker::new("d-1", 0, 5)).await?;
    let ids: Vec<String> = repo.list_workers().await?.into_iter().map(|w| w.id).collect();
    assert_eq!(ids, vec!["d-1", "d-2"]);

    let bad = Worker::new("d-3", 6, 5);
    assert!(matches!(
        repo.upsert_worker(&bad).await,
        Err(FairshareError::ValidationError(_))
    ));

    let suspended = repo.set_availability("d-1", Availability::Suspended).await?;
    assert!(suspended.is_suspended());
    assert!(matches!(
        repo.set_availability("nobody", Availability::Suspended).await,
        Err(FairshareError::WorkerNotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_work_items_replaced_wholesale() -> FairshareResult<()> {
    let repo = InMemoryRosterRepository::new();
    repo.replace_work_items(vec![
        WorkItem::new("r-1", 40.0, 30, "north"),
        WorkItem::new("r-2", 60.0, 45, "south"),
    ])
    .await?;
    repo.replace_work_items(vec![WorkItem::new("r-3", 10.0, 20, "north")])
        .await?;
    let items = repo.list_work_items().await?;
    assert_eq!(items.len(), 1);
    assert!(repo.get_work_item("r-1").await?.is_none());

    let out_of_range = repo
        .replace_work_items(vec![WorkItem::new("r-4", 120.0, 20, "north")])
        .await;
    assert!(matches!(out_of_range, Err(FairshareError::ValidationError(_))));
    let duplicated = repo
        .replace_work_items(vec![
            WorkItem::new("r-5", 10.0, 20, "north"),
            WorkItem::new("r-5", 20.0, 20, "north"),
        ])
        .await;
    assert!(duplicated.is_err());
    // 失败的替换不影响已有数据
    assert_eq!(repo.list_work_items().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_proposal_compare_and_update() -> FairshareResult<()> {
    let repo = InMemoryProposalRepository::new();
    let mut p = proposal("d-1", "d-2", "r-1");
    repo.insert(&p).await?;
    assert!(repo.insert(&p).await.is_err());

    p.transition(ProposalState::Accepted, "d-2", Utc::now())?;
    assert!(repo.compare_and_update(ProposalState::Pending, &p).await?);
    // 第二次写入时状态已不是 pending
    assert!(!repo.compare_and_update(ProposalState::Pending, &p).await?);

    let stored = repo.get(p.id).await?.unwrap();
    assert_eq!(stored.state, ProposalState::Accepted);
    Ok(())
}

#[tokio::test]
async fn test_proposal_list_filters() -> FairshareResult<()> {
    let repo = InMemoryProposalRepository::new();
    let first = proposal("d-1", "d-2", "r-1");
    let second = proposal("d-3", "d-1", "r-2");
    let third = proposal("d-3", "d-4", "r-3");
    for p in [&first, &second, &third] {
        repo.insert(p).await?;
    }

    let by_worker = ProposalFilter {
        worker_id: Some("d-1".to_string()),
        state: None,
    };
    let ids: Vec<Uuid> = repo.list(&by_worker).await?.iter().map(|p| p.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.id) && ids.contains(&second.id));
    assert_eq!(repo.list(&ProposalFilter::pending()).await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_audit_sequence_and_paging() -> FairshareResult<()> {
    let repo = std::sync::Arc::new(InMemoryAuditRepository::new());
    let now = Utc::now();
    for i in 0..5 {
        let action = if i % 2 == 0 {
            AuditAction::SwapProposed
        } else {
            AuditAction::SwapRejected
        };
        let stored = repo
            .append(AuditEntry::new(AuditActor::worker("d-1"), action, "proposal:x", now))
            .await?;
        assert_eq!(stored.sequence, i + 1);
    }

    let filter = AuditFilter {
        action: Some(AuditAction::SwapProposed),
        ..AuditFilter::default()
    };
    let first = repo.query_page(&filter, None, 2).await?;
    assert_eq!(first.entries.len(), 2);
    assert_eq!(first.next_cursor, Some(3));
    let second = repo.query_page(&filter, first.next_cursor, 2).await?;
    assert_eq!(second.entries.len(), 1);
    assert_eq!(second.entries[0].sequence, 5);
    assert_eq!(second.next_cursor, None);

    // 每次 stream() 都从头执行
    let query = AuditQuery::new(repo.clone(), filter).with_page_size(1);
    let once: Vec<AuditEntry> = query.stream().try_collect().await?;
    let twice: Vec<AuditEntry> = query.stream().try_collect().await?;
    assert_eq!(once.len(), 3);
    assert_eq!(once, twice);
    Ok(())
}
