use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};
use std::time::Duration;

use crate::error::ItemError;
use crate::models::Coordinates;

/// Fixed query selectors sent with every page request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogQuery {
    /// Main category (1 = for sale)
    pub category_main: u32,
    /// Property type (1 = apartments)
    pub category_type: u32,
    /// Region (10 = Prague)
    pub region_id: u32,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            category_main: 1,
            category_type: 1,
            region_id: 10,
        }
    }
}

/// Limits and pacing for walking the paginated catalog
#[derive(Debug, Clone)]
pub struct PaginationPolicy {
    pub per_page: u32,
    pub max_pages: u32,
    /// Pause between consecutive page requests
    pub request_delay: Duration,
    /// Stop as soon as a page comes back with fewer than `per_page` items
    pub stop_on_short_page: bool,
}

impl Default for PaginationPolicy {
    fn default() -> Self {
        Self {
            per_page: 20,
            max_pages: 100,
            request_delay: Duration::from_millis(1000),
            stop_on_short_page: false,
        }
    }
}

impl PaginationPolicy {
    /// Hard cap on the number of records one walk may accumulate.
    pub fn item_cap(&self) -> usize {
        self.max_pages as usize * self.per_page as usize
    }
}

/// Paging counters as reported by the provider. Any of them may be missing or wrong.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PageMeta {
    #[serde(default)]
    pub result_size: Option<u64>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub per_page: Option<u64>,
    #[serde(default)]
    pub page_count: Option<u64>,
}

/// One page of catalog results
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    pub listings: Vec<RawRecord>,
    pub meta: PageMeta,
}

/// Response body of one page request
#[derive(Debug, Deserialize)]
pub(crate) struct PageEnvelope {
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<PageEmbedded>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PageEmbedded {
    #[serde(default)]
    pub estates: Vec<Value>,
}

impl From<PageEnvelope> for PageResult {
    fn from(envelope: PageEnvelope) -> Self {
        let listings = envelope
            .embedded
            .map(|embedded| embedded.estates)
            .unwrap_or_default()
            .into_iter()
            .map(RawRecord::new)
            .collect();

        Self {
            listings,
            meta: envelope.meta,
        }
    }
}

/// A catalog record exactly as received, plus its detail payload when one was fetched.
///
/// Records are decoded one at a time so a malformed entry only costs itself.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub payload: Value,
    pub detail: Option<Value>,
}

impl RawRecord {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            detail: None,
        }
    }

    /// Provider identifier, if the record carries a readable one.
    pub fn provider_id(&self) -> Option<i64> {
        self.payload.get("hash_id").and_then(Value::as_i64)
    }

    pub fn decode(&self) -> Result<RawListing, ItemError> {
        let mut listing: RawListing =
            serde_json::from_value(self.payload.clone()).map_err(|source| ItemError::Decode {
                provider_id: self.provider_id(),
                source,
            })?;

        if let Some(detail) = &self.detail {
            match serde_json::from_value::<RawDetail>(detail.clone()) {
                Ok(detail) => listing.detail = Some(Box::new(detail)),
                Err(e) => tracing::warn!(
                    provider_id = listing.hash_id,
                    error = %e,
                    "ignoring undecodable detail payload"
                ),
            }
        }

        listing.source = self.payload.clone();
        Ok(listing)
    }
}

/// Provider-format listing.
///
/// Only `hash_id` is required. Every other field is read leniently: a value of
/// the wrong JSON type is treated as absent instead of failing the record.
#[derive(Debug, Clone, Deserialize)]
pub struct RawListing {
    #[serde(rename = "_links", default, deserialize_with = "lenient")]
    pub links: Option<RawLinks>,
    pub hash_id: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub category: Option<i32>,
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: Option<i32>,
    #[serde(default, deserialize_with = "lenient")]
    pub price: Option<Number>,
    #[serde(default, deserialize_with = "lenient")]
    pub price_czk: Option<PriceDescriptor>,
    #[serde(default, deserialize_with = "lenient")]
    pub locality: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub gps: Option<RawGps>,
    #[serde(rename = "_embedded", default, deserialize_with = "lenient")]
    pub embedded: Option<RawEmbedded>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub items: Option<Vec<RawAttribute>>,
    #[serde(skip)]
    pub detail: Option<Box<RawDetail>>,
    #[serde(skip)]
    pub source: Value,
}

/// Extra data from the per-listing detail endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDetail {
    #[serde(default, deserialize_with = "lenient")]
    pub price: Option<Number>,
    #[serde(default, deserialize_with = "lenient")]
    pub price_czk: Option<PriceDescriptor>,
    #[serde(rename = "_embedded", default, deserialize_with = "lenient")]
    pub embedded: Option<RawEmbedded>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub items: Option<Vec<RawAttribute>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGps {
    #[serde(default, deserialize_with = "lenient")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub lon: Option<f64>,
}

impl RawGps {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates {
            lat: self.lat?,
            lon: self.lon?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceDescriptor {
    #[serde(default, deserialize_with = "lenient")]
    pub value_raw: Option<Number>,
    #[serde(default, deserialize_with = "lenient")]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLinks {
    #[serde(rename = "self", default, deserialize_with = "lenient")]
    pub self_link: Option<Href>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Href {
    pub href: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEmbedded {
    #[serde(default, deserialize_with = "lenient_list")]
    pub images: Option<Vec<RawImage>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImage {
    #[serde(rename = "_links", default, deserialize_with = "lenient")]
    pub links: Option<ImageLinks>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageLinks {
    #[serde(default, deserialize_with = "lenient")]
    pub view: Option<Href>,
}

/// One `(name, value, type, unit)` attribute tuple
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAttribute {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(rename = "type", default, deserialize_with = "lenient_or_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient")]
    pub unit: Option<String>,
}

/// Read a field as `T`, or `None` when it is null or of another shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

/// Read an array element by element, dropping elements that do not fit `T`.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(values) => Ok(Some(
            values
                .into_iter()
                .filter_map(|value| T::deserialize(value).ok())
                .collect(),
        )),
        _ => Ok(None),
    }
}

impl RawAttribute {
    /// Text form of the value used for keyword matching.
    pub fn value_text(&self) -> String {
        value_text(&self.value)
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(values) => values
            .iter()
            .map(|v| match v.get("value") {
                Some(inner) => value_text(inner),
                None => value_text(v),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
