//! PostgreSQL integration tests using testcontainers.
//!
//! These tests compare the PostgreSQL engine against SQLite on the same data.
//! They require Docker to be running. Set SKIP_POSTGRES_TESTS=1 to skip.

mod common;

use common::{TestIndexer, frame, live, postgres_or_skip};
use forkchoice_core::{Engine, FrameFilter};
use forkchoice_metadata::{Indexer, MetadataStore, PostgresStore};
use std::sync::Arc;

async fn seed(indexer: &Indexer) {
    let cancel = live();
    let fixtures = [
        frame("syd1-prysm-001", "f-1", 0, 6_000_000).with_labels(["reorg", "mainnet"]),
        frame("ams3-teku-001", "f-2", 0, 6_000_000).with_labels(["mainnet"]),
        frame("ams3-teku-001", "F-3", 12, 6_000_001).with_labels(["mainnet", "late"]),
        frame("Ams3-lighthouse-001", "f-4", 24, 6_000_002),
        frame("syd1-prysm-001", "f-5", 36, 6_000_034).with_labels(["reorg"]),
    ];
    for metadata in &fixtures {
        indexer.add_frame(metadata, &cancel).await.unwrap();
    }
}

#[tokio::test]
async fn test_postgres_matches_sqlite() {
    let Some(postgres) = postgres_or_skip().await else {
        return;
    };
    let sqlite = TestIndexer::new().await.expect("Failed to create SQLite indexer");

    let pg = postgres.indexer();
    let lite = sqlite.indexer();
    assert_eq!(pg.engine(), Engine::Postgres);
    assert_eq!(lite.engine(), Engine::Sqlite);

    seed(&pg).await;
    seed(&lite).await;

    let cancel = live();
    let filters = [
        FrameFilter::open(),
        FrameFilter::open().with_labels(["mainnet"]),
        FrameFilter::open().with_labels(["mainnet", "reorg"]),
        FrameFilter::open().with_node("ams3-teku-001"),
        FrameFilter::open().with_epoch(187_500u64),
        FrameFilter::open().with_labels(["reorg"]).with_slot(6_000_034u64),
        FrameFilter::open().with_labels(["absent"]),
    ];

    for filter in &filters {
        assert_eq!(
            pg.list_frames(filter, &cancel).await.unwrap(),
            lite.list_frames(filter, &cancel).await.unwrap(),
            "list_frames {filter:?}"
        );
        assert_eq!(
            pg.list_distinct_nodes(filter, &cancel).await.unwrap(),
            lite.list_distinct_nodes(filter, &cancel).await.unwrap(),
            "list_distinct_nodes {filter:?}"
        );
        assert_eq!(
            pg.list_distinct_slots(filter, &cancel).await.unwrap(),
            lite.list_distinct_slots(filter, &cancel).await.unwrap(),
            "list_distinct_slots {filter:?}"
        );
        assert_eq!(
            pg.list_distinct_epochs(filter, &cancel).await.unwrap(),
            lite.list_distinct_epochs(filter, &cancel).await.unwrap(),
            "list_distinct_epochs {filter:?}"
        );
        assert_eq!(
            pg.list_distinct_labels(filter, &cancel).await.unwrap(),
            lite.list_distinct_labels(filter, &cancel).await.unwrap(),
            "list_distinct_labels {filter:?}"
        );
    }

    assert_eq!(
        pg.list_sources(&cancel).await.unwrap(),
        lite.list_sources(&cancel).await.unwrap()
    );
}

#[tokio::test]
async fn test_postgres_text_order_is_bytewise() {
    let Some(postgres) = postgres_or_skip().await else {
        return;
    };
    let indexer = postgres.indexer();
    seed(&indexer).await;
    let cancel = live();

    // Uppercase sorts before lowercase regardless of the database locale.
    let nodes = indexer
        .list_distinct_nodes(&FrameFilter::open(), &cancel)
        .await
        .unwrap();
    assert_eq!(
        nodes,
        vec!["Ams3-lighthouse-001", "ams3-teku-001", "syd1-prysm-001"]
    );

    let frames = indexer
        .list_frames(&FrameFilter::open(), &cancel)
        .await
        .unwrap();
    let ids: Vec<&str> = frames.iter().map(|frame| frame.id.as_str()).collect();
    assert_eq!(ids, vec!["f-1", "f-2", "F-3", "f-4", "f-5"]);

    let sources = indexer.list_sources(&cancel).await.unwrap();
    assert_eq!(
        sources.keys().map(String::as_str).collect::<Vec<_>>(),
        nodes.iter().map(String::as_str).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_postgres_migrate_is_idempotent() {
    let Some(postgres) = postgres_or_skip().await else {
        return;
    };
    seed(&postgres.indexer()).await;

    postgres.postgres_store.migrate().await.unwrap();
    let reopened = PostgresStore::from_url(postgres.url(), 2, Some(5_000))
        .await
        .expect("Reopen failed");
    reopened.health_check().await.unwrap();

    let indexer = Indexer::new(Arc::new(reopened));
    let frames = indexer
        .list_frames(&FrameFilter::open(), &live())
        .await
        .unwrap();
    assert_eq!(frames.len(), 5);
}
