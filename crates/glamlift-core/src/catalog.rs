//! Catalog records produced by the upstream harvest.
//!
//! The harvest exports a JSON array of loosely filled objects; fields may be
//! missing, null, or padded with whitespace. Everything is resolved once at
//! load time into a strict [`CatalogRecord`] where absence is an explicit
//! empty string, so the rest of the pipeline never deals with options.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GlamliftError, Result};

/// One physical artifact to migrate. Read-only during migration.
///
/// `unique_id` is externally assigned and immutable; it joins the ledger,
/// the catalog, and the remote metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub unique_id: String,
    pub title: String,
    pub creator: String,
    pub description: String,
    pub date: String,
    pub dimensions: String,
    pub object_type: String,
    pub accession: String,
    pub original_citation: String,
    /// URL of the full-resolution source image.
    pub image_url: String,
    /// URL of the catalog detail page describing the artifact.
    pub detail_url: String,
    /// Semicolon-delimited target category list.
    pub categories: String,
    /// Path of the local binary asset.
    pub local_path: String,
    /// Desired filename at the remote store.
    pub target_filename: String,
}

/// Raw record as exported by the harvest (its original column names).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordImport {
    pub unique_id: Option<String>,
    #[serde(rename = "titel")]
    pub title: Option<String>,
    #[serde(rename = "vervaardiger")]
    pub creator: Option<String>,
    #[serde(rename = "inhoud")]
    pub description: Option<String>,
    #[serde(rename = "datum")]
    pub date: Option<String>,
    #[serde(rename = "afmetingen")]
    pub dimensions: Option<String>,
    #[serde(rename = "type")]
    pub object_type: Option<String>,
    #[serde(rename = "aanwezig_in")]
    pub accession: Option<String>,
    #[serde(rename = "origineel")]
    pub original_citation: Option<String>,
    pub image_url: Option<String>,
    pub detail_url: Option<String>,
    #[serde(rename = "commons_categories")]
    pub categories: Option<String>,
    #[serde(rename = "local_image_path")]
    pub local_path: Option<String>,
    #[serde(rename = "WikiCommonsFilename")]
    pub target_filename: Option<String>,
}

fn clean(value: Option<String>) -> String {
    value.map(|s| s.trim().to_string()).unwrap_or_default()
}

impl From<RecordImport> for CatalogRecord {
    fn from(raw: RecordImport) -> Self {
        CatalogRecord {
            unique_id: clean(raw.unique_id),
            title: clean(raw.title),
            creator: clean(raw.creator),
            description: clean(raw.description),
            date: clean(raw.date),
            dimensions: clean(raw.dimensions),
            object_type: clean(raw.object_type),
            accession: clean(raw.accession),
            original_citation: clean(raw.original_citation),
            image_url: clean(raw.image_url),
            detail_url: clean(raw.detail_url),
            categories: clean(raw.categories),
            local_path: clean(raw.local_path),
            target_filename: clean(raw.target_filename),
        }
    }
}

/// Load catalog records from a harvest JSON export.
///
/// Records without a unique id are dropped; they cannot be tracked.
pub fn load_records(path: &Path) -> Result<Vec<CatalogRecord>> {
    let data =
        std::fs::read_to_string(path).map_err(|e| GlamliftError::io_with_path(e, path))?;
    let raw: Vec<RecordImport> = serde_json::from_str(&data)?;

    let records: Vec<CatalogRecord> = raw
        .into_iter()
        .map(CatalogRecord::from)
        .filter(|r| !r.unique_id.is_empty())
        .collect();

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_normalizes_missing_fields() {
        let raw: RecordImport = serde_json::from_str(
            r#"{
                "unique_id": " BBB-1 ",
                "titel": "De wolf en de ezel",
                "datum": null,
                "WikiCommonsFilename": "De wolf en de ezel - BBB-1.jpg"
            }"#,
        )
        .unwrap();

        let record = CatalogRecord::from(raw);
        assert_eq!(record.unique_id, "BBB-1");
        assert_eq!(record.title, "De wolf en de ezel");
        assert_eq!(record.date, "");
        assert_eq!(record.creator, "");
        assert_eq!(record.target_filename, "De wolf en de ezel - BBB-1.jpg");
    }

    #[test]
    fn test_load_records_drops_unidentified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"[
                {"unique_id": "BBB-1", "titel": "Eerste"},
                {"titel": "Zonder id"},
                {"unique_id": "BBB-2", "titel": "Tweede"}
            ]"#,
        )
        .unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].unique_id, "BBB-1");
        assert_eq!(records[1].unique_id, "BBB-2");
    }

    #[test]
    fn test_load_records_missing_file() {
        let result = load_records(Path::new("/nonexistent/catalog.json"));
        assert!(result.is_err());
    }
}
