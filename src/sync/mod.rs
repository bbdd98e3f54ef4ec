pub mod coordinator;
pub mod engine;

pub use coordinator::{StatusReport, SyncCoordinator};
pub use engine::Reconciler;
