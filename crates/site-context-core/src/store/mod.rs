//! Storage abstraction for website contexts.
//!
//! The [`ContextStore`] trait owns the [`WebsiteContext`] lifecycle. The
//! pipeline writes through it and chat only reads. Implementations must be
//! `Send + Sync` to be shared across tokio tasks.
//!
//! URLs passed to every operation are expected to be canonical (see
//! [`normalize_url`](crate::normalize::normalize_url)); stores compare them
//! byte-for-byte.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::models::{ContextPayload, WebsiteContext};

/// Abstract storage backend for website contexts.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_fresh_completed`](ContextStore::find_fresh_completed) | Cache lookup by URL |
/// | [`create_processing`](ContextStore::create_processing) | Insert a new `processing` record |
/// | [`complete_with`](ContextStore::complete_with) | `processing → completed` |
/// | [`fail_with`](ContextStore::fail_with) | `processing → failed` |
/// | [`get`](ContextStore::get) | Fetch a record by id |
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Newest `completed` record for `url` created less than `max_age` ago.
    async fn find_fresh_completed(
        &self,
        url: &str,
        max_age: Duration,
    ) -> Result<Option<WebsiteContext>>;

    /// Insert a `processing` record and return its id.
    ///
    /// No uniqueness is enforced on `url`: two concurrent requests produce
    /// two records.
    async fn create_processing(&self, url: &str, user_id: Option<&str>) -> Result<String>;

    /// Write the payload and move the record to `completed`.
    ///
    /// Errors if the record is missing or no longer `processing`.
    async fn complete_with(&self, id: &str, payload: &ContextPayload) -> Result<()>;

    /// Record `message` and move the record to `failed`.
    ///
    /// Errors if the record is missing or no longer `processing`.
    async fn fail_with(&self, id: &str, message: &str) -> Result<()>;

    /// Fetch a record by id.
    async fn get(&self, id: &str) -> Result<Option<WebsiteContext>>;
}

/// A record created at `created_at` is fresh iff `now - created_at < max_age`.
///
/// A record exactly `max_age` old is stale.
pub fn is_fresh(created_at: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    now.signed_duration_since(created_at) < max_age
}
