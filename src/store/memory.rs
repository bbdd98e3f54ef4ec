//! In-memory repository for tests and local runs without a database.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{
    ListingRecord, ListingStats, NormalizedListing, RunUpdate, SyncRun, SyncStatus, UpsertOutcome,
};
use crate::store::ListingRepository;

/// Listing store backed by process memory. Data is lost on restart.
#[derive(Default)]
pub struct MemoryRepository {
    listings: RwLock<HashMap<i64, ListingRecord>>,
    runs: RwLock<Vec<SyncRun>>,
    rejected: RwLock<HashSet<i64>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future upsert of `provider_id` fail as a row-level rejection.
    pub async fn reject_provider_id(&self, provider_id: i64) {
        self.rejected.write().await.insert(provider_id);
    }

    pub async fn listing_count(&self) -> usize {
        self.listings.read().await.len()
    }

    pub async fn active_ids(&self) -> HashSet<i64> {
        self.listings
            .read()
            .await
            .values()
            .filter(|r| r.is_active)
            .map(|r| r.listing.provider_id)
            .collect()
    }
}

#[async_trait]
impl ListingRepository for MemoryRepository {
    async fn upsert(&self, listing: &NormalizedListing) -> Result<UpsertOutcome, RepositoryError> {
        if self.rejected.read().await.contains(&listing.provider_id) {
            return Err(RepositoryError::Rejected(format!(
                "listing {} refused",
                listing.provider_id
            )));
        }

        let now = Utc::now();
        let mut listings = self.listings.write().await;

        match listings.get_mut(&listing.provider_id) {
            Some(existing) => {
                existing.listing = listing.clone();
                existing.last_seen = now;
                existing.is_active = true;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                listings.insert(
                    listing.provider_id,
                    ListingRecord {
                        id: Uuid::new_v4(),
                        listing: listing.clone(),
                        first_seen: now,
                        last_seen: now,
                        is_active: true,
                    },
                );
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn mark_inactive(&self, seen: &HashSet<i64>) -> Result<u64, RepositoryError> {
        let mut listings = self.listings.write().await;
        let mut count = 0;

        for record in listings.values_mut() {
            if record.is_active && !seen.contains(&record.listing.provider_id) {
                record.is_active = false;
                count += 1;
            }
        }

        Ok(count)
    }

    async fn find_by_provider_id(
        &self,
        provider_id: i64,
    ) -> Result<Option<ListingRecord>, RepositoryError> {
        Ok(self.listings.read().await.get(&provider_id).cloned())
    }

    async fn stats(&self) -> Result<ListingStats, RepositoryError> {
        let listings = self.listings.read().await;
        let active = listings.values().filter(|r| r.is_active).count() as i64;
        let total = listings.len() as i64;

        let last_sync_at = self
            .runs
            .read()
            .await
            .iter()
            .filter(|run| run.status == SyncStatus::Completed)
            .filter_map(|run| run.completed_at)
            .max();

        Ok(ListingStats {
            total,
            active,
            inactive: total - active,
            last_sync_at,
        })
    }

    async fn create_run(&self) -> Result<SyncRun, RepositoryError> {
        let run = SyncRun::started(Utc::now());
        self.runs.write().await.push(run.clone());
        Ok(run)
    }

    async fn update_run(&self, id: Uuid, update: RunUpdate) -> Result<SyncRun, RepositoryError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .iter_mut()
            .find(|run| run.id == id)
            .ok_or(RepositoryError::RunNotFound(id))?;

        if run.status.is_terminal() {
            return Err(RepositoryError::InvalidTransition {
                id,
                status: run.status,
            });
        }

        run.finish(&update, Utc::now());
        Ok(run.clone())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<SyncRun>, RepositoryError> {
        // Runs are appended in start order.
        Ok(self
            .runs
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn latest_finished_run(&self) -> Result<Option<SyncRun>, RepositoryError> {
        Ok(self
            .runs
            .read()
            .await
            .iter()
            .rev()
            .find(|run| run.status.is_terminal())
            .cloned())
    }
}
