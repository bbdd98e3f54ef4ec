//! Test doubles for driving the sync pipeline without the network.
//!
//! `ScriptedCatalog` serves pre-built pages and records which pages were
//! requested. Pair it with `store::MemoryRepository` for a fully in-process
//! cycle.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};

use crate::catalog::types::{PageMeta, PageResult, PaginationPolicy, RawRecord};
use crate::catalog::CatalogSource;
use crate::error::TransportError;

/// A catalog that replays scripted pages.
///
/// Clones share state, so a test can keep a handle and change the script
/// between cycles. Pages past the end of the script come back empty.
#[derive(Clone)]
pub struct ScriptedCatalog {
    policy: PaginationPolicy,
    pages: Arc<RwLock<Vec<PageResult>>>,
    failing_page: Arc<RwLock<Option<u32>>>,
    /// Consumed by the first page request; holds that request until notified.
    gate: Arc<RwLock<Option<Arc<Notify>>>>,
    requests: Arc<RwLock<Vec<u32>>>,
}

impl ScriptedCatalog {
    /// Serve `listings` split into pages of `per_page`, with accurate counters.
    pub fn with_listings(listings: Vec<Value>, per_page: u32) -> Self {
        let policy = PaginationPolicy {
            per_page,
            request_delay: Duration::ZERO,
            ..PaginationPolicy::default()
        };
        let pages = paginate(listings, per_page);
        Self::with_pages(pages, policy)
    }

    /// Serve pages exactly as given, counters included.
    pub fn with_pages(pages: Vec<PageResult>, policy: PaginationPolicy) -> Self {
        Self {
            policy,
            pages: Arc::new(RwLock::new(pages)),
            failing_page: Arc::new(RwLock::new(None)),
            gate: Arc::new(RwLock::new(None)),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Hold the next page request until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Arc::new(RwLock::new(Some(gate)));
        self
    }

    /// Replace the script with a new listing set, paginated like `with_listings`.
    pub async fn replace_listings(&self, listings: Vec<Value>) {
        *self.pages.write().await = paginate(listings, self.policy.per_page);
    }

    /// Make every request for `page` fail with HTTP 503.
    pub async fn fail_on_page(&self, page: u32) {
        *self.failing_page.write().await = Some(page);
    }

    pub async fn clear_failure(&self) {
        *self.failing_page.write().await = None;
    }

    /// Every page number requested so far, in order.
    pub async fn requested_pages(&self) -> Vec<u32> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl CatalogSource for ScriptedCatalog {
    async fn fetch_page(
        &self,
        page: u32,
        _extra: &[(&str, String)],
    ) -> Result<PageResult, TransportError> {
        self.requests.write().await.push(page);

        let gate = self.gate.write().await.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if *self.failing_page.read().await == Some(page) {
            return Err(TransportError::Status {
                url: format!("scripted://page/{}", page),
                status: 503,
            });
        }

        let pages = self.pages.read().await;
        let index = (page as usize).saturating_sub(1);
        Ok(pages.get(index).cloned().unwrap_or_default())
    }

    fn pagination(&self) -> &PaginationPolicy {
        &self.policy
    }

    fn source_name(&self) -> &'static str {
        "Scripted"
    }
}

fn paginate(listings: Vec<Value>, per_page: u32) -> Vec<PageResult> {
    let per_page = per_page.max(1) as usize;
    let result_size = listings.len() as u64;
    let page_count = listings.len().div_ceil(per_page) as u64;

    listings
        .chunks(per_page)
        .enumerate()
        .map(|(index, chunk)| PageResult {
            listings: chunk.iter().cloned().map(RawRecord::new).collect(),
            meta: PageMeta {
                result_size: Some(result_size),
                page: Some(index as u64 + 1),
                per_page: Some(per_page as u64),
                page_count: Some(page_count),
            },
        })
        .collect()
}

/// A well-formed catalog entry in the provider's wire format.
pub fn sample_listing(provider_id: i64, name: &str) -> Value {
    json!({
        "hash_id": provider_id,
        "name": name,
        "category": 1,
        "type": 1,
        "price": 6_490_000,
        "locality": "Praha 3, Žižkov",
        "gps": { "lat": 50.0833, "lon": 14.4500 },
        "_links": {
            "self": { "href": format!("/api/en/v2/estates/{}", provider_id) }
        },
        "_embedded": {
            "images": [
                { "_links": { "view": { "href": format!("https://img.example/{}/1.jpg", provider_id) } } }
            ]
        },
        "items": [
            { "name": "Vlastnictví", "value": "Osobní", "type": "string" },
            { "name": "Užitná plocha", "value": "54", "type": "area", "unit": "m2" },
            { "name": "Balkón", "value": "ano", "type": "boolean" }
        ]
    })
}
