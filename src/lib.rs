//! imgharvest - scheduled image harvesting.
//!
//! Scans a single web page for images, filters out decorative ones, names the
//! rest `{YYYYMMDD}_{filename}` and uploads them to a destination store,
//! skipping names already present there.

pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod http_client;
pub mod naming;
pub mod pipeline;
pub mod retry;
pub mod store;

pub use config::{HarvestConfig, StoreConfig};
pub use error::{DecodeError, FetchError, RunFatalError, StoreError};
pub use pipeline::{Harvester, RunReport, RunSummary};
