use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::traits::CatalogSource;
use crate::catalog::types::{PageEnvelope, PageResult, PaginationPolicy, RawRecord};
use crate::config::ApiConfig;
use crate::error::TransportError;

/// Client for the Sreality estates API
pub struct SrealityClient {
    client: Client,
    config: ApiConfig,
}

impl SrealityClient {
    /// Create a client with the default public-catalog settings
    pub fn new() -> Result<Self> {
        Self::with_config(ApiConfig::default())
    }

    /// Create a client with custom settings
    pub fn with_config(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    fn page_query(&self, page: u32) -> Vec<(&'static str, String)> {
        let query = &self.config.query;
        vec![
            ("category_main_cb", query.category_main.to_string()),
            ("category_type_cb", query.category_type.to_string()),
            ("locality_region_id", query.region_id.to_string()),
            ("per_page", self.config.pagination.per_page.to_string()),
            ("page", page.to_string()),
        ]
    }

    /// Fetch the detail document for one listing.
    pub async fn fetch_detail(&self, provider_id: i64) -> Result<Value, TransportError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), provider_id);
        let request = self
            .client
            .get(&url)
            .timeout(self.config.detail_timeout);
        send_json(request, &url).await
    }
}

#[async_trait]
impl CatalogSource for SrealityClient {
    async fn fetch_page(
        &self,
        page: u32,
        extra: &[(&str, String)],
    ) -> Result<PageResult, TransportError> {
        let url = &self.config.base_url;
        debug!("Fetching page {} from {}", page, url);

        let mut query: Vec<(&str, String)> = self.page_query(page);
        query.extend(extra.iter().map(|(k, v)| (*k, v.clone())));

        let request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&query);
        let envelope: PageEnvelope = send_json(request, url).await?;

        Ok(envelope.into())
    }

    fn pagination(&self) -> &PaginationPolicy {
        &self.config.pagination
    }

    fn source_name(&self) -> &'static str {
        "Sreality"
    }

    async fn enrich(&self, records: Vec<RawRecord>) -> Vec<RawRecord> {
        if !self.config.fetch_details {
            return records;
        }

        let total = records.len();
        let mut enriched = Vec::with_capacity(total);
        for (index, mut record) in records.into_iter().enumerate() {
            if let Some(provider_id) = record.provider_id() {
                match self.fetch_detail(provider_id).await {
                    Ok(detail) => record.detail = Some(detail),
                    Err(e) => warn!(
                        provider_id,
                        error = %e,
                        "detail fetch failed, keeping basic listing"
                    ),
                }
                // The page delay follows the last record.
                if index + 1 < total {
                    tokio::time::sleep(self.config.detail_delay).await;
                }
            }
            enriched.push(record);
        }
        enriched
    }
}

async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    url: &str,
) -> Result<T, TransportError> {
    let response = request
        .send()
        .await
        .map_err(|source| TransportError::Request {
            url: url.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        warn!("{} returned status: {}", url, response.status());
        return Err(TransportError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|source| TransportError::Decode {
            url: url.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn page_query_carries_fixed_selectors() {
        let client = SrealityClient::new().unwrap();
        let query = client.page_query(3);

        assert!(query.contains(&("category_main_cb", "1".to_string())));
        assert!(query.contains(&("category_type_cb", "1".to_string())));
        assert!(query.contains(&("locality_region_id", "10".to_string())));
        assert!(query.contains(&("per_page", "20".to_string())));
        assert!(query.contains(&("page", "3".to_string())));
    }

    #[tokio::test]
    async fn enrichment_is_a_no_op_when_disabled() {
        let client = SrealityClient::new().unwrap();
        let records = vec![RawRecord::new(serde_json::json!({ "hash_id": 1 }))];

        let enriched = client.enrich(records.clone()).await;
        assert_eq!(enriched, records);
    }

    fn unreachable_detail_client(detail_delay: Duration) -> SrealityClient {
        SrealityClient::with_config(ApiConfig {
            // Nothing listens on the discard port.
            base_url: "http://127.0.0.1:9/estates".to_string(),
            fetch_details: true,
            detail_delay,
            detail_timeout: Duration::from_millis(100),
            ..ApiConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn failed_detail_fetch_keeps_basic_listing() {
        let client = unreachable_detail_client(Duration::ZERO);
        let records = vec![
            RawRecord::new(serde_json::json!({ "hash_id": 1, "name": "A" })),
            RawRecord::new(serde_json::json!({ "hash_id": 2, "name": "B" })),
        ];

        let enriched = client.enrich(records.clone()).await;

        assert_eq!(enriched, records);
        assert!(enriched.iter().all(|record| record.detail.is_none()));
    }

    #[tokio::test]
    async fn detail_delay_is_not_spent_after_the_last_record() {
        let client = unreachable_detail_client(Duration::from_secs(1));
        let records = vec![
            RawRecord::new(serde_json::json!({ "hash_id": 1 })),
            RawRecord::new(serde_json::json!({ "hash_id": 2 })),
        ];

        let started = std::time::Instant::now();
        client.enrich(records).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
    }
}
