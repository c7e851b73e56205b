pub mod detector;
pub mod error;
pub mod fetcher;
pub mod notify;
pub mod orchestrator;
pub mod rating;
pub mod recorder;
pub mod retry;
pub mod run_log;
pub mod sites;
pub mod snapshot;
pub mod store;
pub mod summary;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use orchestrator::{Monitor, MonitorParts, MonitorSettings};
