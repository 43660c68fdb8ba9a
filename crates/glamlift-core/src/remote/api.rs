//! Wire types for the MediaWiki action API.
//!
//! The API reports failures two ways at once: transport-level HTTP status
//! codes and an `error` object embedded in an otherwise 200 response body.
//! Every response struct here carries an optional [`ApiErrorBody`] so the
//! client can treat the body as the source of truth.

use crate::error::{GlamliftError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Error object embedded in an API response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub info: String,
}

impl ApiErrorBody {
    /// Convert into the crate error type.
    pub fn into_error(self) -> GlamliftError {
        GlamliftError::Api {
            code: self.code,
            info: self.info,
        }
    }
}

/// Response to a `meta=tokens` query.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub query: Option<TokenQuery>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub tokens: Tokens,
}

#[derive(Debug, Deserialize)]
pub struct Tokens {
    pub logintoken: Option<String>,
    pub csrftoken: Option<String>,
}

/// Response to `action=login`.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub login: Option<LoginResult>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct LoginResult {
    pub result: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Response to a `titles=` page query.
///
/// With the default format version, `pages` is keyed by page id as a
/// string. Missing titles appear under the sentinel key `"-1"`.
#[derive(Debug, Deserialize)]
pub struct QueryPagesResponse {
    pub query: Option<PagesQuery>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct PagesQuery {
    #[serde(default)]
    pub pages: HashMap<String, PageInfo>,
}

#[derive(Debug, Deserialize)]
pub struct PageInfo {
    pub pageid: Option<u64>,
    pub title: Option<String>,
    pub missing: Option<Value>,
}

impl QueryPagesResponse {
    /// The page id of the first found page, if any title matched.
    pub fn found_pageid(&self) -> Option<u64> {
        let query = self.query.as_ref()?;
        query
            .pages
            .iter()
            .find(|(key, page)| key.as_str() != "-1" && page.missing.is_none())
            .and_then(|(_, page)| page.pageid)
    }
}

/// Response to `action=wbgetentities`.
#[derive(Debug, Deserialize)]
pub struct EntitiesResponse {
    #[serde(default)]
    pub entities: HashMap<String, Value>,
    pub error: Option<ApiErrorBody>,
}

/// Response to `action=wbcreateclaim` or `action=wbsetqualifier`.
#[derive(Debug, Deserialize)]
pub struct ClaimResponse {
    pub claim: Option<ClaimBody>,
    pub success: Option<u8>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimBody {
    pub id: String,
}

/// Response to `action=wbsetlabel`.
#[derive(Debug, Deserialize)]
pub struct LabelResponse {
    pub success: Option<u8>,
    pub error: Option<ApiErrorBody>,
}

/// Response to `action=upload`.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub upload: Option<UploadResult>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct UploadResult {
    pub result: String,
    pub filename: Option<String>,
}

/// Labels and statement counts currently present on a remote entity.
///
/// Only what the reconciler needs: which languages carry a label (and its
/// text), and how many statements each property has.
#[derive(Debug, Clone, Default)]
pub struct RemoteEntityState {
    pub labels: HashMap<String, String>,
    pub statements: HashMap<String, usize>,
}

impl RemoteEntityState {
    /// Build from the entity JSON returned by `wbgetentities`.
    ///
    /// Empty MediaInfo entities serialize `statements` as `[]` instead of
    /// `{}`, so both shapes must parse to an empty map.
    pub fn from_entity_json(entity: &Value) -> Self {
        let mut state = Self::default();

        if let Some(labels) = entity.get("labels").and_then(Value::as_object) {
            for (language, label) in labels {
                if let Some(text) = label.get("value").and_then(Value::as_str) {
                    state.labels.insert(language.clone(), text.to_string());
                }
            }
        }

        if let Some(statements) = entity.get("statements").and_then(Value::as_object) {
            for (property, claims) in statements {
                let count = claims.as_array().map(Vec::len).unwrap_or(0);
                state.statements.insert(property.clone(), count);
            }
        }

        state
    }

    /// Whether at least one statement exists for the property.
    pub fn has_statement(&self, property: &str) -> bool {
        self.statements.get(property).copied().unwrap_or(0) > 0
    }

    /// The label text for a language, if set.
    pub fn label(&self, language: &str) -> Option<&str> {
        self.labels.get(language).map(String::as_str)
    }
}

/// A statement or qualifier value in one of the encodings the API accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementValue {
    /// Reference to a wiki item, e.g. `Q1250322`.
    Entity(String),
    /// Plain string value.
    Str(String),
    /// Text tagged with a language code.
    Monolingual { text: String, language: String },
}

impl StatementValue {
    /// Serialize to the JSON string the `value` form field expects.
    pub fn to_wire(&self) -> Result<String> {
        let value = match self {
            StatementValue::Entity(qid) => {
                let numeric: u64 = qid
                    .strip_prefix('Q')
                    .and_then(|digits| digits.parse().ok())
                    .ok_or_else(|| GlamliftError::Validation {
                        field: "entity id".into(),
                        message: format!("expected Q-item id, got '{}'", qid),
                    })?;
                serde_json::json!({
                    "entity-type": "item",
                    "numeric-id": numeric,
                    "id": qid,
                })
            }
            StatementValue::Str(text) => Value::String(text.clone()),
            StatementValue::Monolingual { text, language } => serde_json::json!({
                "text": text,
                "language": language,
            }),
        };
        Ok(serde_json::to_string(&value)?)
    }
}
