//! Keeps a local listing store in step with the Sreality estates catalog.

pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod sync;
pub mod testing;

pub use config::AppConfig;
pub use error::{ItemError, RepositoryError, SyncError, TransportError};
pub use sync::{Reconciler, SyncCoordinator};
