//! Listing and run-log storage.
//!
//! Available backends:
//! - `MemoryRepository` - in-process maps, used by tests and as a fallback
//! - `PostgresRepository` - PostgreSQL via sqlx

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{ListingRecord, ListingStats, NormalizedListing, RunUpdate, SyncRun, UpsertOutcome};

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// Persistence contract used by the reconciliation engine.
#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// Insert or update a listing keyed by `provider_id`.
    ///
    /// Always marks the row active and advances `last_seen`; `first_seen` is
    /// only written on creation.
    async fn upsert(&self, listing: &NormalizedListing) -> Result<UpsertOutcome, RepositoryError>;

    /// Deactivate every active listing whose `provider_id` is not in `seen`.
    /// Returns the number of rows that changed.
    async fn mark_inactive(&self, seen: &HashSet<i64>) -> Result<u64, RepositoryError>;

    async fn find_by_provider_id(
        &self,
        provider_id: i64,
    ) -> Result<Option<ListingRecord>, RepositoryError>;

    async fn stats(&self) -> Result<ListingStats, RepositoryError>;

    /// Open a new run in the `running` state.
    async fn create_run(&self) -> Result<SyncRun, RepositoryError>;

    /// Move a running run to its terminal state. Terminal runs are immutable.
    async fn update_run(&self, id: Uuid, update: RunUpdate) -> Result<SyncRun, RepositoryError>;

    /// Most recent runs first.
    async fn recent_runs(&self, limit: usize) -> Result<Vec<SyncRun>, RepositoryError>;

    /// Most recent run that reached `completed` or `failed`.
    async fn latest_finished_run(&self) -> Result<Option<SyncRun>, RepositoryError>;
}
