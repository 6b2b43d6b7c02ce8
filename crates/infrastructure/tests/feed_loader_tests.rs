use std::io::Write;

use fairshare_config::FeedConfig;
use fairshare_domain::{Availability, FairshareError};
use fairshare_infrastructure::FeedLoader;
use tempfile::NamedTempFile;

fn write_feed(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_load_feeds_from_config() {
    let items = write_feed(
        r#"[
            {"id": "r-1", "difficulty": 35.5, "estimated_minutes": 40, "zone": "north"},
            {"id": "r-2", "difficulty": 80, "estimated_minutes": 90, "zone": "south", "required_tags": ["hazmat"]}
        ]"#,
    );
    let workers = write_feed(
        r#"[
            {"id": "d-1", "capacity_min": 1, "capacity_max": 8, "tags": ["hazmat"]},
            {"id": "d-2", "capacity_min": 0, "capacity_max": 8, "availability": "suspended"}
        ]"#,
    );
    let config = FeedConfig {
        work_items_path: Some(items.path().to_string_lossy().into_owned()),
        workers_path: Some(workers.path().to_string_lossy().into_owned()),
    };

    let feed = FeedLoader::load(&config).await.unwrap();
    assert_eq!(feed.items.len(), 2);
    assert!(feed.items[1].required_tags.contains("hazmat"));
    assert_eq!(feed.workers.len(), 2);
    assert_eq!(feed.workers[1].availability, Availability::Suspended);
}

#[tokio::test]
async fn test_missing_sources_yield_empty_feed() {
    let feed = FeedLoader::load(&FeedConfig::default()).await.unwrap();
    assert!(feed.items.is_empty());
    assert!(feed.workers.is_empty());
}

#[tokio::test]
async fn test_rejects_invalid_feeds() {
    let out_of_range = write_feed(r#"[{"id": "r-1", "difficulty": 101, "estimated_minutes": 10, "zone": "n"}]"#);
    assert!(matches!(
        FeedLoader::load_work_items(out_of_range.path()).await,
        Err(FairshareError::ValidationError(_))
    ));

    let duplicated = write_feed(
        r#"[
            {"id": "d-1", "capacity_min": 0, "capacity_max": 3},
            {"id": "d-1", "capacity_min": 0, "capacity_max": 4}
        ]"#,
    );
    assert!(FeedLoader::load_workers(duplicated.path()).await.is_err());

    let malformed = write_feed("{not json");
    assert!(FeedLoader::load_workers(malformed.path()).await.is_err());

    assert!(matches!(
        FeedLoader::load_workers("/nonexistent/fairshare/workers.json").await,
        Err(FairshareError::Configuration(_))
    ));
}

#[test]
fn test_parse_work_items() {
    let items = FeedLoader::parse_work_items(
        r#"[{"id": "r-9", "difficulty": 0, "estimated_minutes": 5, "zone": "east"}]"#,
    )
    .unwrap();
    assert_eq!(items[0].id, "r-9");
}
