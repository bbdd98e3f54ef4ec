use async_trait::async_trait;
use estate_sync::catalog::types::{PageMeta, PageResult, PaginationPolicy, RawRecord};
use estate_sync::catalog::CatalogSource;
use estate_sync::models::{
    ListingRecord, ListingStats, NormalizedListing, RunUpdate, SyncRun, SyncStatus, UpsertOutcome,
};
use estate_sync::store::{ListingRepository, MemoryRepository};
use estate_sync::testing::{sample_listing, ScriptedCatalog};
use estate_sync::{Reconciler, RepositoryError, SyncCoordinator, SyncError};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

fn setup(catalog: ScriptedCatalog, batch_size: usize) -> (SyncCoordinator, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    let reconciler = Reconciler::new(Arc::new(catalog), repo.clone(), batch_size);
    (SyncCoordinator::new(reconciler), repo)
}

fn page(ids: std::ops::RangeInclusive<i64>, meta: PageMeta) -> PageResult {
    PageResult {
        listings: ids
            .map(|id| RawRecord::new(sample_listing(id, "Flat")))
            .collect(),
        meta,
    }
}

fn policy(per_page: u32, max_pages: u32) -> PaginationPolicy {
    PaginationPolicy {
        per_page,
        max_pages,
        request_delay: Duration::ZERO,
        stop_on_short_page: false,
    }
}

#[tokio::test]
async fn delisted_item_is_deactivated_on_next_cycle() {
    let catalog = ScriptedCatalog::with_listings(
        vec![
            sample_listing(1, "A"),
            sample_listing(2, "B"),
            sample_listing(3, "C"),
        ],
        2,
    );
    let (coordinator, repo) = setup(catalog.clone(), 100);

    let first = coordinator.run_now().await.unwrap();
    assert_eq!(first.total_items, 3);
    assert_eq!(first.new_items, 3);
    assert_eq!(catalog.requested_pages().await, vec![1, 2]);

    let before = repo.find_by_provider_id(1).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    catalog
        .replace_listings(vec![sample_listing(1, "A"), sample_listing(2, "B")])
        .await;
    let second = coordinator.run_now().await.unwrap();

    assert_eq!(second.total_items, 2);
    assert_eq!(second.updated_items, 2);
    assert_eq!(second.deleted_items, 1);

    let a = repo.find_by_provider_id(1).await.unwrap().unwrap();
    let b = repo.find_by_provider_id(2).await.unwrap().unwrap();
    let c = repo.find_by_provider_id(3).await.unwrap().unwrap();
    assert!(a.is_active);
    assert!(b.is_active);
    assert!(!c.is_active);
    assert!(a.last_seen > before.last_seen);
    assert_eq!(a.first_seen, before.first_seen);

    let runs = coordinator.history(Some(1)).await.unwrap();
    assert_eq!(runs[0].status, SyncStatus::Completed);
    assert_eq!(runs[0].deleted_items, 1);
}

#[tokio::test]
async fn second_trigger_is_rejected_while_first_runs() {
    let gate = Arc::new(Notify::new());
    let catalog = ScriptedCatalog::with_listings(vec![sample_listing(1, "A")], 10)
        .with_gate(gate.clone());
    let (coordinator, _repo) = setup(catalog, 100);

    let first = coordinator.trigger_manual().unwrap();
    assert!(coordinator.is_running());
    assert!(matches!(
        coordinator.trigger_manual(),
        Err(SyncError::AlreadyRunning)
    ));
    assert!(matches!(
        coordinator.run_now().await,
        Err(SyncError::AlreadyRunning)
    ));

    gate.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome.new_items, 1);
    assert!(!coordinator.is_running());

    let again = coordinator.trigger_manual().unwrap();
    let outcome = again.await.unwrap().unwrap();
    assert_eq!(outcome.updated_items, 1);

    // Rejected triggers never opened a run.
    assert_eq!(coordinator.history(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn malformed_item_does_not_block_the_batch() {
    let catalog = ScriptedCatalog::with_listings(
        vec![
            sample_listing(1, "A"),
            json!({ "name": "no id", "price": 1_000_000 }),
            sample_listing(3, "C"),
            sample_listing(4, "D"),
        ],
        10,
    );
    let (coordinator, repo) = setup(catalog, 2);

    let outcome = coordinator.run_now().await.unwrap();

    assert_eq!(outcome.total_items, 4);
    assert_eq!(outcome.new_items, 3);
    assert_eq!(outcome.skipped_items, 1);
    assert_eq!(repo.listing_count().await, 3);

    let run = coordinator.last_status().await.unwrap().unwrap();
    assert_eq!(run.status, SyncStatus::Completed);
    assert_eq!(run.skipped_items, 1);
}

#[tokio::test]
async fn mistyped_fields_are_stored_as_absent() {
    let catalog = ScriptedCatalog::with_listings(
        vec![
            json!({ "hash_id": 2, "name": "B", "price": "on request" }),
            json!({ "hash_id": 11, "gps": { "lat": "50.08", "lon": 14.42 } }),
            json!({ "hash_id": 12, "items": [{ "name": "Cellar", "value": "yes", "type": null }] }),
            json!({ "hash_id": 13, "category": "1" }),
        ],
        10,
    );
    let (coordinator, repo) = setup(catalog, 100);

    let outcome = coordinator.run_now().await.unwrap();

    assert_eq!(outcome.new_items, 4);
    assert_eq!(outcome.skipped_items, 0);

    let priced = repo.find_by_provider_id(2).await.unwrap().unwrap();
    assert_eq!(priced.listing.name, "B");
    assert_eq!(priced.listing.price, None);

    let located = repo.find_by_provider_id(11).await.unwrap().unwrap();
    assert_eq!(located.listing.gps, None);

    let cellar = repo.find_by_provider_id(12).await.unwrap().unwrap();
    assert_eq!(cellar.listing.facts.has_cellar, Some(true));

    let categorized = repo.find_by_provider_id(13).await.unwrap().unwrap();
    assert_eq!(categorized.listing.category, None);
}

#[tokio::test]
async fn under_reported_page_count_still_walks_every_page() {
    let meta = PageMeta {
        result_size: Some(45),
        page: None,
        per_page: Some(20),
        page_count: Some(1),
    };
    let catalog = ScriptedCatalog::with_pages(
        vec![
            page(1..=20, meta.clone()),
            page(21..=40, meta.clone()),
            page(41..=45, meta),
        ],
        policy(20, 100),
    );

    let records = catalog.fetch_all_pages().await.unwrap();

    assert_eq!(records.len(), 45);
    assert_eq!(catalog.requested_pages().await, vec![1, 2, 3]);
}

#[tokio::test]
async fn walk_stops_at_max_pages() {
    let meta = PageMeta {
        result_size: Some(10),
        page: None,
        per_page: Some(2),
        page_count: Some(5),
    };
    let pages = (0..5)
        .map(|i| page(i * 2 + 1..=i * 2 + 2, meta.clone()))
        .collect();
    let catalog = ScriptedCatalog::with_pages(pages, policy(2, 3));

    let records = catalog.fetch_all_pages().await.unwrap();

    assert_eq!(records.len(), 6);
    assert_eq!(catalog.requested_pages().await, vec![1, 2, 3]);
}

#[tokio::test]
async fn short_page_ends_walk_when_enabled() {
    let meta = PageMeta {
        result_size: Some(100),
        page: None,
        per_page: Some(20),
        page_count: Some(5),
    };
    let mut short_policy = policy(20, 100);
    short_policy.stop_on_short_page = true;
    let catalog = ScriptedCatalog::with_pages(
        vec![page(1..=20, meta.clone()), page(21..=25, meta)],
        short_policy,
    );

    let records = catalog.fetch_all_pages().await.unwrap();

    assert_eq!(records.len(), 25);
    assert_eq!(catalog.requested_pages().await, vec![1, 2]);
}

#[tokio::test]
async fn failed_page_fails_the_run_and_keeps_listings_active() {
    let catalog = ScriptedCatalog::with_listings(
        (1..=4).map(|id| sample_listing(id, "Flat")).collect(),
        2,
    );
    let (coordinator, repo) = setup(catalog.clone(), 100);
    coordinator.run_now().await.unwrap();

    catalog.fail_on_page(2).await;
    let result = coordinator.run_now().await;

    assert!(matches!(result, Err(SyncError::Transport(_))));
    assert_eq!(repo.active_ids().await.len(), 4);

    let run = coordinator.last_status().await.unwrap().unwrap();
    assert_eq!(run.status, SyncStatus::Failed);
    assert!(run.completed_at.is_some());
    assert!(run.error_message.unwrap().contains("503"));

    catalog.clear_failure().await;
    assert!(coordinator.run_now().await.is_ok());
}

#[tokio::test]
async fn upserting_twice_keeps_one_record() {
    let catalog = ScriptedCatalog::with_listings(vec![sample_listing(1, "Old")], 10);
    let (coordinator, repo) = setup(catalog.clone(), 100);
    coordinator.run_now().await.unwrap();
    let before = repo.find_by_provider_id(1).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    catalog.replace_listings(vec![sample_listing(1, "New")]).await;
    coordinator.run_now().await.unwrap();

    let after = repo.find_by_provider_id(1).await.unwrap().unwrap();
    assert_eq!(repo.listing_count().await, 1);
    assert_eq!(after.listing.name, "New");
    assert_eq!(after.first_seen, before.first_seen);
    assert!(after.last_seen > before.last_seen);
}

/// Repository whose writes fail as if the database went away.
struct UnreachableStore {
    inner: MemoryRepository,
}

#[async_trait]
impl ListingRepository for UnreachableStore {
    async fn upsert(&self, _listing: &NormalizedListing) -> Result<UpsertOutcome, RepositoryError> {
        Err(RepositoryError::Unavailable("connection reset".into()))
    }

    async fn mark_inactive(&self, seen: &HashSet<i64>) -> Result<u64, RepositoryError> {
        self.inner.mark_inactive(seen).await
    }

    async fn find_by_provider_id(
        &self,
        provider_id: i64,
    ) -> Result<Option<ListingRecord>, RepositoryError> {
        self.inner.find_by_provider_id(provider_id).await
    }

    async fn stats(&self) -> Result<ListingStats, RepositoryError> {
        self.inner.stats().await
    }

    async fn create_run(&self) -> Result<SyncRun, RepositoryError> {
        self.inner.create_run().await
    }

    async fn update_run(&self, id: Uuid, update: RunUpdate) -> Result<SyncRun, RepositoryError> {
        self.inner.update_run(id, update).await
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<SyncRun>, RepositoryError> {
        self.inner.recent_runs(limit).await
    }

    async fn latest_finished_run(&self) -> Result<Option<SyncRun>, RepositoryError> {
        self.inner.latest_finished_run().await
    }
}

#[tokio::test]
async fn unavailable_store_fails_the_cycle() {
    let catalog = ScriptedCatalog::with_listings(vec![sample_listing(1, "A")], 10);
    let repo = Arc::new(UnreachableStore {
        inner: MemoryRepository::new(),
    });
    let coordinator = SyncCoordinator::new(Reconciler::new(Arc::new(catalog), repo, 100));

    let result = coordinator.run_now().await;

    assert!(matches!(
        result,
        Err(SyncError::Repository(RepositoryError::Unavailable(_)))
    ));
    let run = coordinator.last_status().await.unwrap().unwrap();
    assert_eq!(run.status, SyncStatus::Failed);
    assert!(!coordinator.is_running());
}
