pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod github_store;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod render;
pub mod snapshot;
pub mod store;
pub mod tui;

pub use crate::models::{Listing, RemovedListing, StatusFlag};
pub use crate::reconcile::{reconcile, Reconciliation};
pub use crate::snapshot::{Snapshot, SnapshotError};
