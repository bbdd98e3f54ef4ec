//! Environment-driven configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::catalog::types::{CatalogQuery, PaginationPolicy};
use crate::error::ConfigError;

/// Settings for the external catalog client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub query: CatalogQuery,
    pub pagination: PaginationPolicy,
    pub fetch_details: bool,
    pub detail_delay: Duration,
    pub detail_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.sreality.cz/api/en/v2/estates".to_string(),
            user_agent: "PrahEstate-Service/1.0".to_string(),
            timeout: Duration::from_secs(30),
            query: CatalogQuery::default(),
            pagination: PaginationPolicy::default(),
            fetch_details: false,
            detail_delay: Duration::from_millis(500),
            detail_timeout: Duration::from_secs(15),
        }
    }
}

/// Settings for the reconciliation schedule
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub enabled: bool,
    pub schedule: String,
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: "0 */6 * * *".to_string(),
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub api: ApiConfig,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub sync: SyncConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        let env = Lookup(&lookup);

        let pagination = PaginationPolicy {
            per_page: env.positive("API_PER_PAGE", defaults.api.pagination.per_page)?,
            max_pages: env.positive("API_MAX_PAGES", defaults.api.pagination.max_pages)?,
            request_delay: Duration::from_millis(
                env.parse("API_REQUEST_DELAY_MS", 1000u64)?,
            ),
            stop_on_short_page: env.flag(
                "API_STOP_ON_SHORT_PAGE",
                defaults.api.pagination.stop_on_short_page,
            )?,
        };

        let query = CatalogQuery {
            category_main: env.parse("API_CATEGORY_MAIN", defaults.api.query.category_main)?,
            category_type: env.parse("API_CATEGORY_TYPE", defaults.api.query.category_type)?,
            region_id: env.parse("API_REGION_ID", defaults.api.query.region_id)?,
        };

        let api = ApiConfig {
            base_url: env.string("SREALITY_API_URL", &defaults.api.base_url),
            user_agent: env.string("API_USER_AGENT", &defaults.api.user_agent),
            timeout: Duration::from_secs(env.parse("API_TIMEOUT_SECS", 30u64)?),
            query,
            pagination,
            fetch_details: env.flag("API_FETCH_DETAILS", defaults.api.fetch_details)?,
            detail_delay: Duration::from_millis(env.parse("API_DETAIL_DELAY_MS", 500u64)?),
            detail_timeout: defaults.api.detail_timeout,
        };

        let sync = SyncConfig {
            enabled: env.flag("SYNC_ENABLED", defaults.sync.enabled)?,
            schedule: env.string("SYNC_SCHEDULE", &defaults.sync.schedule),
            batch_size: env.positive("SYNC_BATCH_SIZE", defaults.sync.batch_size)?,
        };

        Ok(Self {
            api,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            sync,
        })
    }
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.0)(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn positive<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default + ToString,
        T::Err: std::fmt::Display,
    {
        let value = self.parse(key, default)?;
        if value <= T::default() {
            return Err(ConfigError::Invalid {
                key,
                value: value.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(value)
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match (self.0)(key) {
            None => Ok(default),
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" | "" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    key,
                    value: raw,
                    reason: "expected a boolean".to_string(),
                }),
            },
        }
    }
}
