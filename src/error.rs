//! Typed errors for the sync pipeline.

use thiserror::Error;
use uuid::Uuid;

use crate::models::SyncStatus;

/// Failure talking to the external catalog. Always aborts the cycle.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure reported by a listing repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Connection, pool or IO trouble; nothing further can be written this cycle.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused a single row.
    #[error("store rejected write: {0}")]
    Rejected(String),

    #[error("sync run {0} not found")]
    RunNotFound(Uuid),

    #[error("sync run {id} is already {status}")]
    InvalidTransition { id: Uuid, status: SyncStatus },
}

impl RepositoryError {
    /// True when the failure concerns one row and the cycle may continue.
    pub fn is_item_scoped(&self) -> bool {
        matches!(self, RepositoryError::Rejected(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        let item_scoped = match &err {
            sqlx::Error::Database(db_err) => is_row_sqlstate(db_err.code().as_deref()),
            sqlx::Error::Encode(_) => true,
            _ => false,
        };

        if item_scoped {
            RepositoryError::Rejected(err.to_string())
        } else {
            RepositoryError::Unavailable(err.to_string())
        }
    }
}

/// SQLSTATE classes 22 (data exception) and 23 (integrity constraint) are
/// caused by the row being written. Every other class points at the server,
/// the connection or the schema.
fn is_row_sqlstate(code: Option<&str>) -> bool {
    matches!(code, Some(code) if code.starts_with("22") || code.starts_with("23"))
}

/// A single catalog record that could not be reconciled. Logged and skipped.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("listing {} could not be decoded: {source}", display_id(.provider_id))]
    Decode {
        provider_id: Option<i64>,
        #[source]
        source: serde_json::Error,
    },

    #[error("listing {provider_id} could not be stored: {source}")]
    Store {
        provider_id: i64,
        #[source]
        source: RepositoryError,
    },
}

fn display_id(id: &Option<i64>) -> String {
    id.map(|id| id.to_string())
        .unwrap_or_else(|| "<unknown>".to_string())
}

/// Cycle-level failure surfaced to whoever triggered the sync.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync is already running")]
    AlreadyRunning,

    #[error("catalog fetch failed: {0}")]
    Transport(#[from] TransportError),

    #[error("repository failure: {0}")]
    Repository(#[from] RepositoryError),
}

/// Invalid value in the process environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
