//! File description rendering for the remote wiki store.
//!
//! Maps catalog fields onto an Artwork-style description page: free-text
//! fields pass through, the description is wrapped in a Dutch language
//! template, the object type becomes bilingual when the catalog carries
//! both terms, and the source block cites the image URL, the detail page,
//! and the collection identifier. Pure string assembly, no I/O.

use crate::catalog::CatalogRecord;

const INSTITUTION: &str = "{{Institution:Koninklijke Bibliotheek}}";
const LICENSE: &str = "{{PD-US-expired|PD-old-70}}";
const BASE_CATEGORY: &str = "[[Category:Beeldbank Nederlandse Boekgeschiedenis]]";

/// Wrap text in the Dutch language template, or return empty for empty input.
fn wrap_nl(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!("{{{{nl|1={}}}}}", text)
    }
}

/// Prefix the original-work citation, or return empty for empty input.
fn prefix_original(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!("Orgineel: {}", text)
    }
}

/// Uppercase the first character and lowercase the rest.
fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
        }
        None => String::new(),
    }
}

/// Format the object type as bilingual language templates.
///
/// The catalog stores "Dutch term, English term". Anything else (single
/// term, empty, extra commas) is returned capitalized without templates.
fn format_bilingual_type(type_str: &str) -> String {
    if type_str.is_empty() {
        return String::new();
    }

    let parts: Vec<&str> = type_str.split(", ").collect();
    if parts.len() == 2 {
        format!(
            "{{{{nl|1={}}}}} {{{{en|1={}}}}}",
            capitalize(parts[0].trim()),
            capitalize(parts[1].trim())
        )
    } else {
        capitalize(type_str.trim())
    }
}

/// Convert a record id to its citation form: the first hyphen becomes a
/// colon ("BBB-1" to "BBB:1").
fn citation_id(unique_id: &str) -> String {
    unique_id.replacen('-', ":", 1)
}

/// Build the category lines: the base collection category plus the record's
/// semicolon-delimited categories, one `[[Category:...]]` per line.
fn build_categories(categories: &str) -> String {
    let mut lines = vec![BASE_CATEGORY.to_string()];

    for cat in categories.split(';') {
        let cat = cat.trim();
        if !cat.is_empty() {
            lines.push(format!("[[Category:{}]]", cat));
        }
    }

    lines.join("\n")
}

/// Render the complete description page for a record.
///
/// The caller passes the record with category exclusions already applied.
pub fn render_description(record: &CatalogRecord) -> String {
    let source = format!(
        "{{{{Koninklijke Bibliotheek}}}}\n\
         * Image: {}\n\
         * Metadata: {}\n\
         * Beeldbank Nederlandse Boekgeschiedenis Identifier: {}",
        record.image_url,
        record.detail_url,
        citation_id(&record.unique_id)
    );

    let mut text = String::new();
    text.push_str("=={{int:filedesc}}==\n");
    text.push_str("{{Artwork\n");
    text.push_str(&format!("| title = {}\n", record.title));
    text.push_str(&format!("| artist = {}\n", record.creator));
    text.push_str(&format!("| description = {}\n", wrap_nl(&record.description)));
    text.push_str(&format!("| date = {}\n", record.date));
    text.push_str(&format!("| dimensions = {}\n", record.dimensions));
    text.push_str(&format!(
        "| object type = {}\n",
        format_bilingual_type(&record.object_type)
    ));
    text.push_str(&format!("| institution = {}\n", INSTITUTION));
    text.push_str(&format!("| source = {}\n", source));
    text.push_str(&format!("| accession number = {}\n", record.accession));
    text.push_str(&format!(
        "| notes = {}\n",
        prefix_original(&record.original_citation)
    ));
    text.push_str("| permission =\n");
    text.push_str("| other versions =\n");
    text.push_str("}}\n");
    text.push('\n');
    text.push_str("=={{int:license-header}}==\n");
    text.push_str(LICENSE);
    text.push_str("\n\n");
    text.push_str(&build_categories(&record.categories));

    text
}
