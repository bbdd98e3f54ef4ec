use async_trait::async_trait;
use tracing::{debug, info};

use crate::catalog::types::{PageMeta, PageResult, PaginationPolicy, RawRecord};
use crate::error::TransportError;

/// Common trait for paginated listing catalogs.
///
/// Implementors provide single-page retrieval; the full walk is shared.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch one page. `extra` is appended to the fixed query parameters.
    async fn fetch_page(
        &self,
        page: u32,
        extra: &[(&str, String)],
    ) -> Result<PageResult, TransportError>;

    /// Limits and pacing for `fetch_all_pages`.
    fn pagination(&self) -> &PaginationPolicy;

    /// Get the name of the catalog source
    fn source_name(&self) -> &'static str;

    /// Hook to attach extra data to a freshly fetched page. Must not fail.
    async fn enrich(&self, records: Vec<RawRecord>) -> Vec<RawRecord> {
        records
    }

    /// Walk the catalog from page 1 and return every record.
    ///
    /// Any failed page aborts the whole walk: a partial listing set would make
    /// the caller deactivate listings that are still published.
    async fn fetch_all_pages(&self) -> Result<Vec<RawRecord>, TransportError> {
        let policy = self.pagination().clone();
        let item_cap = policy.item_cap();
        let mut records: Vec<RawRecord> = Vec::new();
        let mut page: u32 = 1;

        loop {
            let result = self.fetch_page(page, &[]).await?;
            let page_items = result.listings.len();
            records.extend(self.enrich(result.listings).await);

            let total_pages = estimate_total_pages(&result.meta, &policy, records.len());
            debug!(
                source = self.source_name(),
                page,
                page_items,
                result_size = ?result.meta.result_size,
                page_count = ?result.meta.page_count,
                per_page = ?result.meta.per_page,
                total_pages,
                "fetched catalog page"
            );

            let short_page = policy.stop_on_short_page && page_items < policy.per_page as usize;
            page += 1;

            if short_page || page > total_pages || records.len() >= item_cap {
                break;
            }

            tokio::time::sleep(policy.request_delay).await;
        }

        info!(
            source = self.source_name(),
            records = records.len(),
            pages = page - 1,
            "catalog walk finished"
        );
        Ok(records)
    }
}

/// Best estimate of the catalog's page count after seeing one page.
///
/// Takes the larger of the declared page count and the count implied by
/// `result_size / per_page`, both capped at `max_pages`. Providers are known to
/// under-report `page_count`, so neither number is trusted alone.
pub fn estimate_total_pages(meta: &PageMeta, policy: &PaginationPolicy, accumulated: usize) -> u32 {
    let cap = u64::from(policy.max_pages);
    let per_page = meta
        .per_page
        .filter(|n| *n > 0)
        .unwrap_or(u64::from(policy.per_page));
    let result_size = meta.result_size.unwrap_or(accumulated as u64);

    let calculated = result_size.div_ceil(per_page).min(cap);
    let declared = meta.page_count.unwrap_or(1).min(cap);

    // Bounded by `max_pages`, which is a u32.
    calculated.max(declared) as u32
}
