use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::catalog::{normalize, CatalogSource, RawRecord};
use crate::error::{ItemError, SyncError};
use crate::models::{RunUpdate, SyncOutcome, UpsertOutcome};
use crate::store::ListingRepository;

/// Runs one reconciliation cycle: fetch everything, upsert in batches, then
/// deactivate whatever the catalog no longer lists.
///
/// Callers must not run two cycles at once against the same repository;
/// `SyncCoordinator` enforces that.
pub struct Reconciler {
    catalog: Arc<dyn CatalogSource>,
    repo: Arc<dyn ListingRepository>,
    batch_size: usize,
}

impl Reconciler {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        repo: Arc<dyn ListingRepository>,
        batch_size: usize,
    ) -> Self {
        Self {
            catalog,
            repo,
            batch_size: batch_size.max(1),
        }
    }

    pub fn repository(&self) -> &Arc<dyn ListingRepository> {
        &self.repo
    }

    /// Run a full cycle and record it in the run log.
    ///
    /// The run is always left `completed` or `failed`. A cycle-level error,
    /// including a failed write of the completed state, is returned after the
    /// run has been marked failed.
    pub async fn run_cycle(&self) -> Result<SyncOutcome, SyncError> {
        let run = self.repo.create_run().await?;
        info!(
            run_id = %run.id,
            source = self.catalog.source_name(),
            "Starting sync cycle"
        );

        let result = match self.reconcile().await {
            Ok(outcome) => self
                .repo
                .update_run(run.id, RunUpdate::Completed(outcome))
                .await
                .map(|_| outcome)
                .map_err(SyncError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                info!(
                    run_id = %run.id,
                    total = outcome.total_items,
                    new = outcome.new_items,
                    updated = outcome.updated_items,
                    deactivated = outcome.deleted_items,
                    skipped = outcome.skipped_items,
                    "Sync cycle completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(run_id = %run.id, error = %e, "Sync cycle failed");
                if let Err(update_err) = self
                    .repo
                    .update_run(run.id, RunUpdate::Failed(e.to_string()))
                    .await
                {
                    error!(
                        run_id = %run.id,
                        error = %update_err,
                        "Could not record failed sync run"
                    );
                }
                Err(e)
            }
        }
    }

    async fn reconcile(&self) -> Result<SyncOutcome, SyncError> {
        let records = self.catalog.fetch_all_pages().await?;
        let batch_count = records.len().div_ceil(self.batch_size);
        info!(
            records = records.len(),
            batches = batch_count,
            "Fetched catalog, reconciling"
        );

        let mut outcome = SyncOutcome {
            total_items: records.len() as i64,
            ..SyncOutcome::default()
        };
        let mut seen: HashSet<i64> = HashSet::with_capacity(records.len());

        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            for record in batch {
                match self.reconcile_one(record, &mut seen).await {
                    Ok(UpsertOutcome::Created) => outcome.new_items += 1,
                    Ok(UpsertOutcome::Updated) => outcome.updated_items += 1,
                    Err(ItemError::Store { source, .. }) if !source.is_item_scoped() => {
                        return Err(source.into());
                    }
                    Err(e) => {
                        warn!(error = %e, "Skipping listing");
                        outcome.skipped_items += 1;
                    }
                }
            }
            info!(
                batch = index + 1,
                batches = batch_count,
                size = batch.len(),
                "Processed batch"
            );
        }

        // Only after every batch: an early pass would deactivate rows not yet re-upserted.
        let deactivated = self.repo.mark_inactive(&seen).await?;
        outcome.deleted_items = deactivated as i64;

        Ok(outcome)
    }

    async fn reconcile_one(
        &self,
        record: &RawRecord,
        seen: &mut HashSet<i64>,
    ) -> Result<UpsertOutcome, ItemError> {
        // Any readable id counts as observed, even if the rest of the record is unusable.
        if let Some(provider_id) = record.provider_id() {
            seen.insert(provider_id);
        }

        let raw = record.decode()?;
        let listing = normalize(&raw);

        let result = self
            .repo
            .upsert(&listing)
            .await
            .map_err(|source| ItemError::Store {
                provider_id: listing.provider_id,
                source,
            })?;

        debug!(
            provider_id = listing.provider_id,
            created = result.is_new(),
            "Listing reconciled"
        );
        Ok(result)
    }
}
