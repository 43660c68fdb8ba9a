//! Site configuration and credential resolution.
//!
//! All configuration is explicit: the client and orchestrator take immutable
//! config values at construction, nothing reads ambient globals at call time.
//! Credentials resolve once from the environment.

use crate::error::{GlamliftError, Result};

/// Environment variable holding the remote account name.
pub const USERNAME_ENV: &str = "GLAMLIFT_USERNAME";
/// Environment variable holding the remote account password.
pub const PASSWORD_ENV: &str = "GLAMLIFT_PASSWORD";
/// Environment variable overriding the HTTP user agent.
pub const USER_AGENT_ENV: &str = "GLAMLIFT_USER_AGENT";

/// Default values for site access.
pub struct SiteDefaults;

impl SiteDefaults {
    pub const API_URL: &'static str = "https://commons.wikimedia.org/w/api.php";
    pub const LANGUAGE: &'static str = "nl";
    pub const USER_AGENT: &'static str = "glamlift/0.3 (https://github.com/MrScripty/glamlift)";
    pub const UPLOAD_COMMENT: &'static str =
        "Upload from Beeldbank Nederlandse Boekgeschiedenis - Dutch book history collection \
         by KB, National Library of the Netherlands";
    pub const EDIT_SUMMARY: &'static str =
        "Adding structured data from Beeldbank Nederlandse Boekgeschiedenis";
}

/// Immutable site access configuration for one run.
#[derive(Clone)]
pub struct SiteConfig {
    /// MediaWiki API endpoint, e.g. `https://commons.wikimedia.org/w/api.php`.
    pub api_url: String,
    /// Account name used for the login flow.
    pub username: String,
    /// Account password used for the login flow.
    pub password: String,
    /// HTTP user agent sent on every request.
    pub user_agent: String,
    /// Language code for labels and monolingual statements.
    pub language: String,
    /// Comment attached to file uploads.
    pub upload_comment: String,
    /// Summary attached to statement and label edits.
    pub edit_summary: String,
}

impl std::fmt::Debug for SiteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteConfig")
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("language", &self.language)
            .finish()
    }
}

impl SiteConfig {
    /// Build a config with credentials resolved from the environment.
    ///
    /// `GLAMLIFT_USERNAME` and `GLAMLIFT_PASSWORD` are required; a missing
    /// value is a configuration error. The user agent falls back to the
    /// built-in default when `GLAMLIFT_USER_AGENT` is unset.
    pub fn from_env(api_url: impl Into<String>, language: impl Into<String>) -> Result<Self> {
        let username = require_env(USERNAME_ENV)?;
        let password = require_env(PASSWORD_ENV)?;
        let user_agent = std::env::var(USER_AGENT_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| SiteDefaults::USER_AGENT.to_string());

        Ok(Self {
            api_url: api_url.into(),
            username,
            password,
            user_agent,
            language: language.into(),
            upload_comment: SiteDefaults::UPLOAD_COMMENT.to_string(),
            edit_summary: SiteDefaults::EDIT_SUMMARY.to_string(),
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(GlamliftError::Config {
            message: format!("{} is not set", name),
        }),
    }
}
