//! Authenticated client for the wiki store.
//!
//! Wraps the MediaWiki action API behind the [`RemoteStore`] trait so the
//! reconciler and orchestrator never touch HTTP directly. The client owns
//! the session (login tokens, CSRF token, cookies), paces mutating calls,
//! and retries transient failures with exponential backoff.

use crate::config::SiteConfig;
use crate::error::{GlamliftError, Result};
use crate::remote::api::{
    ClaimResponse, EntitiesResponse, LabelResponse, LoginResponse, QueryPagesResponse,
    RemoteEntityState, StatementValue, TokenResponse, UploadResponse,
};
use crate::remote::throttle::{retry_async, Pacer, ThrottleConfig};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Uploads carry full-resolution scans, so the timeout is generous.
const HTTP_TIMEOUT: Duration = Duration::from_secs(180);

/// MediaInfo entity id, e.g. `M12345`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityId(pub String);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Statement GUID returned by claim creation, e.g. `M12345$aaaa-bbbb`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementRef(pub String);

impl std::fmt::Display for StatementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical page URL for an uploaded file.
///
/// Derived from the API endpoint's origin; spaces in the filename become
/// underscores, matching how the wiki itself links file pages.
pub fn file_page_url(api_url: &str, filename: &str) -> Result<String> {
    let parsed = url::Url::parse(api_url).map_err(|e| GlamliftError::Config {
        message: format!("invalid API URL '{}': {}", api_url, e),
    })?;
    let origin = parsed.origin().ascii_serialization();
    Ok(format!("{}/wiki/File:{}", origin, filename.replace(' ', "_")))
}

/// Operations the migration needs from the wiki store.
///
/// One implementation talks to the live API; tests substitute an in-memory
/// fake to drive the reconciler and orchestrator deterministically.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether a file page with this name already exists.
    async fn exists(&self, filename: &str) -> Result<bool>;

    /// Upload a local file under the given name with its description page.
    async fn upload(&self, local_path: &Path, filename: &str, wikitext: &str) -> Result<()>;

    /// Canonical page URL for a filename at this store.
    fn file_ref(&self, filename: &str) -> Result<String>;

    /// Resolve a filename to its MediaInfo entity id, if the page exists.
    async fn resolve_entity_id(&self, filename: &str) -> Result<Option<EntityId>>;

    /// Fetch the labels and statement counts currently on an entity.
    async fn entity_state(&self, entity: &EntityId) -> Result<RemoteEntityState>;

    /// Set the label for a language on an entity.
    async fn set_label(&self, entity: &EntityId, language: &str, text: &str) -> Result<()>;

    /// Add a new statement to an entity, returning its GUID.
    async fn add_statement(
        &self,
        entity: &EntityId,
        property: &str,
        value: &StatementValue,
    ) -> Result<StatementRef>;

    /// Attach a qualifier to an existing statement.
    async fn add_qualifier(
        &self,
        claim: &StatementRef,
        property: &str,
        value: &StatementValue,
    ) -> Result<()>;
}

/// [`RemoteStore`] implementation backed by the MediaWiki action API.
pub struct WikiClient {
    http: Client,
    config: SiteConfig,
    throttle: ThrottleConfig,
    pacer: Pacer,
    csrf: RwLock<Option<String>>,
}

impl WikiClient {
    /// Build a client. Login is deferred until the first mutating call.
    pub fn new(config: SiteConfig, throttle: ThrottleConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(config.user_agent.clone())
            .cookie_store(true)
            .build()
            .map_err(|e| GlamliftError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        let pacer = Pacer::from_config(&throttle);

        Ok(Self {
            http,
            config,
            throttle,
            pacer,
            csrf: RwLock::new(None),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T> {
        let response = self
            .http
            .get(&self.config.api_url)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Keep the reason phrase in the message so transient statuses
            // classify correctly.
            return Err(GlamliftError::Api {
                code: status.as_str().to_string(),
                info: format!("HTTP {}", status),
            });
        }

        Ok(response.json().await?)
    }

    async fn post_form<T: DeserializeOwned>(&self, form: &[(&str, String)]) -> Result<T> {
        let response = self
            .http
            .post(&self.config.api_url)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GlamliftError::Api {
                code: status.as_str().to_string(),
                info: format!("HTTP {}", status),
            });
        }

        Ok(response.json().await?)
    }

    /// Perform the three-step login and return the CSRF token.
    async fn login(&self) -> Result<String> {
        let tokens: TokenResponse = self
            .get_json(&[
                ("action", "query"),
                ("meta", "tokens"),
                ("type", "login"),
                ("format", "json"),
            ])
            .await?;
        if let Some(error) = tokens.error {
            return Err(error.into_error());
        }
        let login_token = tokens
            .query
            .and_then(|q| q.tokens.logintoken)
            .ok_or_else(|| GlamliftError::Auth("login token missing from response".into()))?;

        let form = vec![
            ("action", "login".to_string()),
            ("lgname", self.config.username.clone()),
            ("lgpassword", self.config.password.clone()),
            ("lgtoken", login_token),
            ("format", "json".to_string()),
        ];
        let response: LoginResponse = self.post_form(&form).await?;
        if let Some(error) = response.error {
            return Err(error.into_error());
        }
        let login = response
            .login
            .ok_or_else(|| GlamliftError::Auth("login response missing result".into()))?;
        if login.result != "Success" {
            let reason = login.reason.unwrap_or(login.result);
            return Err(GlamliftError::Auth(format!("login failed: {}", reason)));
        }

        let tokens: TokenResponse = self
            .get_json(&[("action", "query"), ("meta", "tokens"), ("format", "json")])
            .await?;
        if let Some(error) = tokens.error {
            return Err(error.into_error());
        }
        let csrf = tokens
            .query
            .and_then(|q| q.tokens.csrftoken)
            .ok_or_else(|| GlamliftError::Auth("CSRF token missing from response".into()))?;

        info!("Logged in as {}", self.config.username);
        Ok(csrf)
    }

    /// Return the session's CSRF token, logging in on first use.
    async fn ensure_login(&self) -> Result<String> {
        if let Some(token) = self.csrf.read().await.clone() {
            return Ok(token);
        }
        let token = self.login().await?;
        *self.csrf.write().await = Some(token.clone());
        Ok(token)
    }
}

#[async_trait]
impl RemoteStore for WikiClient {
    async fn exists(&self, filename: &str) -> Result<bool> {
        let title = format!("File:{}", filename);
        let (result, _stats) = retry_async(
            &self.throttle,
            || async {
                let response: QueryPagesResponse = self
                    .get_json(&[
                        ("action", "query"),
                        ("titles", &title),
                        ("format", "json"),
                    ])
                    .await?;
                if let Some(error) = response.error {
                    return Err(error.into_error());
                }
                Ok(response.found_pageid().is_some())
            },
            GlamliftError::is_transient,
        )
        .await;
        result
    }

    async fn upload(&self, local_path: &Path, filename: &str, wikitext: &str) -> Result<()> {
        let csrf = self.ensure_login().await?;
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| GlamliftError::io_with_path(e, local_path))?;

        debug!("Uploading {} ({} bytes)", filename, bytes.len());

        // Multipart forms are consumed on send, so each attempt rebuilds
        // the form from the buffered bytes.
        let (result, _stats) = retry_async(
            &self.throttle,
            || {
                let form = Form::new()
                    .text("action", "upload")
                    .text("filename", filename.to_string())
                    .text("comment", self.config.upload_comment.clone())
                    .text("text", wikitext.to_string())
                    .text("token", csrf.clone())
                    .text("format", "json")
                    .part(
                        "file",
                        Part::bytes(bytes.clone()).file_name(filename.to_string()),
                    );
                async move {
                    self.pacer.pace().await;
                    let response = self
                        .http
                        .post(&self.config.api_url)
                        .multipart(form)
                        .send()
                        .await?;

                    let status = response.status();
                    if !status.is_success() {
                        return Err(GlamliftError::Api {
                            code: status.as_str().to_string(),
                            info: format!("HTTP {}", status),
                        });
                    }

                    let body: UploadResponse = response.json().await?;
                    if let Some(error) = body.error {
                        return Err(error.into_error());
                    }
                    match body.upload {
                        Some(upload) if upload.result == "Success" => Ok(()),
                        Some(upload) => Err(GlamliftError::Api {
                            code: format!("upload-{}", upload.result.to_lowercase()),
                            info: format!("upload returned {}", upload.result),
                        }),
                        None => Err(GlamliftError::Api {
                            code: "upload".into(),
                            info: "response missing upload result".into(),
                        }),
                    }
                }
            },
            GlamliftError::is_transient,
        )
        .await;
        result
    }

    fn file_ref(&self, filename: &str) -> Result<String> {
        file_page_url(&self.config.api_url, filename)
    }

    async fn resolve_entity_id(&self, filename: &str) -> Result<Option<EntityId>> {
        let title = format!("File:{}", filename);
        let (result, _stats) = retry_async(
            &self.throttle,
            || async {
                let response: QueryPagesResponse = self
                    .get_json(&[
                        ("action", "query"),
                        ("titles", &title),
                        ("format", "json"),
                    ])
                    .await?;
                if let Some(error) = response.error {
                    return Err(error.into_error());
                }
                Ok(response
                    .found_pageid()
                    .map(|pageid| EntityId(format!("M{}", pageid))))
            },
            GlamliftError::is_transient,
        )
        .await;
        result
    }

    async fn entity_state(&self, entity: &EntityId) -> Result<RemoteEntityState> {
        let (result, _stats) = retry_async(
            &self.throttle,
            || async {
                let response: EntitiesResponse = self
                    .get_json(&[
                        ("action", "wbgetentities"),
                        ("ids", &entity.0),
                        ("format", "json"),
                    ])
                    .await?;
                if let Some(error) = response.error {
                    return Err(error.into_error());
                }
                let entity_json = response
                    .entities
                    .get(&entity.0)
                    .filter(|json| json.get("missing").is_none())
                    .ok_or_else(|| GlamliftError::RemoteFileMissing(entity.0.clone()))?;
                Ok(RemoteEntityState::from_entity_json(entity_json))
            },
            GlamliftError::is_transient,
        )
        .await;
        result
    }

    async fn set_label(&self, entity: &EntityId, language: &str, text: &str) -> Result<()> {
        let csrf = self.ensure_login().await?;
        let form = vec![
            ("action", "wbsetlabel".to_string()),
            ("id", entity.0.clone()),
            ("language", language.to_string()),
            ("value", text.to_string()),
            ("token", csrf),
            ("format", "json".to_string()),
            ("summary", self.config.edit_summary.clone()),
        ];

        let (result, _stats) = retry_async(
            &self.throttle,
            || async {
                self.pacer.pace().await;
                let response: LabelResponse = self.post_form(&form).await?;
                if let Some(error) = response.error {
                    return Err(error.into_error());
                }
                if response.success.is_none() {
                    return Err(GlamliftError::Api {
                        code: "wbsetlabel".into(),
                        info: "response missing success flag".into(),
                    });
                }
                Ok(())
            },
            GlamliftError::is_transient,
        )
        .await;
        result
    }

    async fn add_statement(
        &self,
        entity: &EntityId,
        property: &str,
        value: &StatementValue,
    ) -> Result<StatementRef> {
        let csrf = self.ensure_login().await?;
        let form = vec![
            ("action", "wbcreateclaim".to_string()),
            ("entity", entity.0.clone()),
            ("snaktype", "value".to_string()),
            ("property", property.to_string()),
            ("value", value.to_wire()?),
            ("token", csrf),
            ("format", "json".to_string()),
            ("summary", self.config.edit_summary.clone()),
        ];

        let (result, _stats) = retry_async(
            &self.throttle,
            || async {
                self.pacer.pace().await;
                let response: ClaimResponse = self.post_form(&form).await?;
                if let Some(error) = response.error {
                    return Err(error.into_error());
                }
                let claim = response.claim.ok_or_else(|| GlamliftError::Api {
                    code: "wbcreateclaim".into(),
                    info: "response missing claim id".into(),
                })?;
                Ok(StatementRef(claim.id))
            },
            GlamliftError::is_transient,
        )
        .await;
        result
    }

    async fn add_qualifier(
        &self,
        claim: &StatementRef,
        property: &str,
        value: &StatementValue,
    ) -> Result<()> {
        let csrf = self.ensure_login().await?;
        let form = vec![
            ("action", "wbsetqualifier".to_string()),
            ("claim", claim.0.clone()),
            ("snaktype", "value".to_string()),
            ("property", property.to_string()),
            ("value", value.to_wire()?),
            ("token", csrf),
            ("format", "json".to_string()),
            ("summary", self.config.edit_summary.clone()),
        ];

        let (result, _stats) = retry_async(
            &self.throttle,
            || async {
                self.pacer.pace().await;
                let response: ClaimResponse = self.post_form(&form).await?;
                if let Some(error) = response.error {
                    return Err(error.into_error());
                }
                if response.success.is_none() {
                    return Err(GlamliftError::Api {
                        code: "wbsetqualifier".into(),
                        info: "response missing success flag".into(),
                    });
                }
                Ok(())
            },
            GlamliftError::is_transient,
        )
        .await;
        result
    }
}
