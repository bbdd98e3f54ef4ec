use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Geographic position of a listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// One provider attribute, kept as the provider sent it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Amenity {
    pub value: serde_json::Value,
    #[serde(rename = "type")]
    pub kind: String,
    pub unit: Option<String>,
}

/// Typed facts pulled out of the attribute list.
///
/// `None` means the provider said nothing about the fact, which is distinct
/// from an explicit negative answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListingFacts {
    pub ownership_type: Option<String>,
    pub has_balcony: Option<bool>,
    pub has_terrace: Option<bool>,
    pub power_efficiency: Option<String>,
    pub has_elevator: Option<bool>,
    pub usable_area: Option<f64>,
    pub has_cellar: Option<bool>,
    pub is_furnished: Option<bool>,
}

/// Canonical listing shape produced from one catalog record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedListing {
    pub provider_id: i64,
    pub name: String,
    pub category: Option<i32>,
    pub listing_type: Option<i32>,
    pub price: Option<i64>,
    pub price_note: Option<String>,
    pub locality: String,
    pub district: Option<String>,
    pub description: Option<String>,
    pub gps: Option<Coordinates>,
    pub images: Vec<String>,
    pub amenities: BTreeMap<String, Amenity>,
    pub facts: ListingFacts,
    pub url: String,
    pub raw_data: serde_json::Value,
}

/// A listing as held by the store, with observation bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub listing: NormalizedListing,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
}

/// Result of writing one listing to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

impl UpsertOutcome {
    pub fn is_new(self) -> bool {
        matches!(self, UpsertOutcome::Created)
    }
}

/// Lifecycle state of a sync run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SyncStatus::Running)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SyncStatus::Running),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(format!("unknown sync status '{other}'")),
        }
    }
}

/// Counters describing what one reconciliation cycle did
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncOutcome {
    pub total_items: i64,
    pub new_items: i64,
    pub updated_items: i64,
    pub deleted_items: i64,
    pub skipped_items: i64,
}

/// One entry of the durable run log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncRun {
    pub id: Uuid,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_items: i64,
    pub new_items: i64,
    pub updated_items: i64,
    pub deleted_items: i64,
    pub skipped_items: i64,
    pub error_message: Option<String>,
}

impl SyncRun {
    /// A fresh run in the `running` state.
    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: SyncStatus::Running,
            started_at: now,
            completed_at: None,
            total_items: 0,
            new_items: 0,
            updated_items: 0,
            deleted_items: 0,
            skipped_items: 0,
            error_message: None,
        }
    }

    /// Apply a terminal transition. Callers must check the run is still running.
    pub fn finish(&mut self, update: &RunUpdate, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        match update {
            RunUpdate::Completed(outcome) => {
                self.status = SyncStatus::Completed;
                self.total_items = outcome.total_items;
                self.new_items = outcome.new_items;
                self.updated_items = outcome.updated_items;
                self.deleted_items = outcome.deleted_items;
                self.skipped_items = outcome.skipped_items;
            }
            RunUpdate::Failed(message) => {
                self.status = SyncStatus::Failed;
                self.error_message = Some(message.clone());
            }
        }
    }
}

/// Terminal transition for a running sync run
#[derive(Debug, Clone, PartialEq)]
pub enum RunUpdate {
    Completed(SyncOutcome),
    Failed(String),
}

/// Aggregate counts over the listing store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListingStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
}
