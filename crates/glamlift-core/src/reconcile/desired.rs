//! The structured data a record should carry on the remote store.
//!
//! Builds the desired label and statement set from catalog fields. The
//! collection membership is expressed through the operator qualifier on
//! the source statement rather than a standalone collection statement.

use crate::catalog::CatalogRecord;
use crate::remote::StatementValue;

// Properties
pub const P_INSTANCE_OF: &str = "P31";
pub const P_COPYRIGHT_STATUS: &str = "P6216";
pub const P_MIME_TYPE: &str = "P1163";
pub const P_TITLE: &str = "P1476";
pub const P_SOURCE_OF_FILE: &str = "P7482";
pub const P_OPERATOR: &str = "P137";
pub const P_FULL_WORK_URL: &str = "P953";
pub const P_DESCRIBED_AT_URL: &str = "P973";

// Items
pub const Q_DIGITAL_IMAGE: &str = "Q1250322";
pub const Q_KB_NETHERLANDS: &str = "Q1526131";
pub const Q_PUBLIC_DOMAIN: &str = "Q19652";
pub const Q_FILE_ON_INTERNET: &str = "Q74228490";

pub const MIME_JPEG: &str = "image/jpeg";

/// A label the record should have in one language.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredLabel {
    pub language: String,
    pub text: String,
}

/// A statement the record should have, with any qualifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredStatement {
    pub property: &'static str,
    pub value: StatementValue,
    pub qualifiers: Vec<(&'static str, StatementValue)>,
}

impl DesiredStatement {
    fn plain(property: &'static str, value: StatementValue) -> Self {
        Self {
            property,
            value,
            qualifiers: Vec::new(),
        }
    }
}

/// Everything a record should carry: one optional label plus statements
/// in the order they are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredStatementSet {
    pub label: Option<DesiredLabel>,
    pub statements: Vec<DesiredStatement>,
}

impl DesiredStatementSet {
    /// Property ids of all desired statements, in application order.
    pub fn properties(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.statements.iter().map(|s| s.property)
    }
}

/// Build the desired structured data for a record.
///
/// The title doubles as the label and the P1476 title statement; both are
/// omitted when the catalog has no title. The source statement carries
/// the operator, the full-work URL, and the detail-page URL as qualifiers.
pub fn desired_for(record: &CatalogRecord, language: &str) -> DesiredStatementSet {
    let mut set = DesiredStatementSet::default();

    if !record.title.is_empty() {
        set.label = Some(DesiredLabel {
            language: language.to_string(),
            text: record.title.clone(),
        });
    }

    set.statements.push(DesiredStatement::plain(
        P_INSTANCE_OF,
        StatementValue::Entity(Q_DIGITAL_IMAGE.into()),
    ));
    set.statements.push(DesiredStatement::plain(
        P_COPYRIGHT_STATUS,
        StatementValue::Entity(Q_PUBLIC_DOMAIN.into()),
    ));
    set.statements.push(DesiredStatement::plain(
        P_MIME_TYPE,
        StatementValue::Str(MIME_JPEG.into()),
    ));

    if !record.title.is_empty() {
        set.statements.push(DesiredStatement::plain(
            P_TITLE,
            StatementValue::Monolingual {
                text: record.title.clone(),
                language: language.to_string(),
            },
        ));
    }

    set.statements.push(DesiredStatement {
        property: P_SOURCE_OF_FILE,
        value: StatementValue::Entity(Q_FILE_ON_INTERNET.into()),
        qualifiers: vec![
            (P_OPERATOR, StatementValue::Entity(Q_KB_NETHERLANDS.into())),
            (P_FULL_WORK_URL, StatementValue::Str(record.image_url.clone())),
            (
                P_DESCRIBED_AT_URL,
                StatementValue::Str(record.detail_url.clone()),
            ),
        ],
    });

    set
}
