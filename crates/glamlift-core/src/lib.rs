//! Glamlift Core - Resilient migration of digitized collections to a wiki
//! media store.
//!
//! This crate moves catalog records (scanned images plus structured
//! metadata) into a MediaWiki/Wikibase site. Progress is tracked per record
//! in a SQLite ledger, so interrupted runs resume where they stopped, and
//! metadata is reconciled against the live entity state, so re-running a
//! record converges instead of duplicating.
//!
//! For the command line front end, see the `glamlift-cli` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use glamlift_core::{Ledger, Orchestrator, SiteConfig, ThrottleConfig, WikiClient};
//!
//! #[tokio::main]
//! async fn main() -> glamlift_core::Result<()> {
//!     let ledger = Ledger::open("glamlift.db")?;
//!     let config = SiteConfig::from_env("https://commons.wikimedia.org/w/api.php", "nl")?;
//!     let client = Arc::new(WikiClient::new(config, ThrottleConfig::default())?);
//!
//!     let summary = Orchestrator::new(ledger)
//!         .with_remote(client)
//!         .with_item_delay(Duration::from_secs(5))
//!         .migrate_all()
//!         .await?;
//!
//!     println!("{} uploaded, {} failed", summary.uploaded, summary.failed);
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod exclusions;
pub mod ledger;
pub mod orchestrator;
pub mod reconcile;
pub mod remote;
pub mod wikitext;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use catalog::{load_records, CatalogRecord};
pub use config::{SiteConfig, SiteDefaults};
pub use error::{GlamliftError, Result};
pub use exclusions::CategoryExclusions;
pub use ledger::{Ledger, LedgerEntry, MigrationState, StatusCounts};
pub use orchestrator::{Orchestrator, PreviewReport, RunSummary, VerifySummary};
pub use reconcile::{desired_for, DesiredStatementSet, ReconcileReport};
pub use remote::{
    file_page_url, EntityId, RemoteEntityState, RemoteStore, StatementRef, StatementValue,
    ThrottleConfig, WikiClient,
};
pub use wikitext::render_description;
