//! Remote wiki store access: API client, pacing, and error classification.
//!
//! This module provides:
//! - The [`RemoteStore`] trait the rest of the crate programs against
//! - An authenticated MediaWiki API client with retry and pacing
//! - Transient-error classification by message pattern
//! - Wire types for the API's JSON responses

mod api;
pub(crate) mod classify;
mod client;
mod throttle;

pub use api::{ApiErrorBody, RemoteEntityState, StatementValue};
pub use classify::is_transient;
pub use client::{file_page_url, EntityId, RemoteStore, StatementRef, WikiClient};
pub use throttle::{retry_async, throttled_sleep, Pacer, RetryStats, ThrottleConfig};
