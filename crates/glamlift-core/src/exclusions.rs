//! Per-record category exclusions.
//!
//! Curators review generated previews and export a JSON overlay naming
//! categories that must not be applied to specific records:
//!
//! ```json
//! {
//!     "category_exclusions": {
//!         "Dutch typography": ["BBB-123", "BBB-456"]
//!     }
//! }
//! ```
//!
//! The overlay is consulted before building a record's category list. A
//! missing file means no exclusions; an unreadable file is logged and
//! treated the same, never aborting a run.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Deserialize)]
struct ExclusionsFile {
    #[serde(default)]
    category_exclusions: HashMap<String, HashSet<String>>,
}

/// Mapping from category name to the record ids it must not be applied to.
#[derive(Debug, Clone, Default)]
pub struct CategoryExclusions {
    by_category: HashMap<String, HashSet<String>>,
}

impl CategoryExclusions {
    /// Load the overlay from a JSON file.
    ///
    /// Missing file yields an empty overlay; a parse failure is logged as a
    /// warning and yields an empty overlay.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) => {
                warn!("Could not read exclusions file {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<ExclusionsFile>(&data) {
            Ok(parsed) => {
                let overlay = Self {
                    by_category: parsed.category_exclusions,
                };
                debug!(
                    "Loaded exclusions for {} categories from {}",
                    overlay.by_category.len(),
                    path.display()
                );
                overlay
            }
            Err(e) => {
                warn!("Could not parse exclusions file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// True when no exclusions are present.
    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }

    /// True if `category` is excluded for `record_id`.
    pub fn is_excluded(&self, category: &str, record_id: &str) -> bool {
        self.by_category
            .get(category)
            .map(|ids| ids.contains(record_id))
            .unwrap_or(false)
    }

    /// Filter a record's semicolon-delimited category list.
    ///
    /// Returns the list with excluded categories removed, joined with "; ".
    pub fn filter(&self, record_id: &str, categories: &str) -> String {
        if self.is_empty() || categories.is_empty() {
            return categories.to_string();
        }

        let kept: Vec<&str> = categories
            .split(';')
            .map(str::trim)
            .filter(|c| !c.is_empty() && !self.is_excluded(c, record_id))
            .collect();

        kept.join("; ")
    }
}
