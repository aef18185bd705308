//! In-memory [`ContextStore`] used by tests and the pipeline's unit checks.
//!
//! Records live in a `HashMap` behind `std::sync::RwLock`.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::models::{ContextPayload, ContextStatus, WebsiteContext};

use super::{is_fresh, ContextStore};

/// In-memory context store.
#[derive(Default)]
pub struct InMemoryContextStore {
    records: RwLock<HashMap<String, WebsiteContext>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record verbatim, e.g. to age it for cache tests.
    pub fn insert(&self, ctx: WebsiteContext) -> Result<()> {
        self.write()?.insert(ctx.id.clone(), ctx);
        Ok(())
    }

    /// Number of records for `url`, in any state.
    pub fn count_for_url(&self, url: &str) -> Result<usize> {
        Ok(self.read()?.values().filter(|c| c.url == url).count())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, WebsiteContext>>> {
        self.records
            .read()
            .map_err(|_| anyhow!("context store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, WebsiteContext>>> {
        self.records
            .write()
            .map_err(|_| anyhow!("context store lock poisoned"))
    }
}

fn require_processing<'a>(
    records: &'a mut HashMap<String, WebsiteContext>,
    id: &str,
) -> Result<&'a mut WebsiteContext> {
    let ctx = records
        .get_mut(id)
        .ok_or_else(|| anyhow!("context not found: {}", id))?;
    if ctx.status != ContextStatus::Processing {
        bail!(
            "context {} is {}, expected processing",
            id,
            ctx.status.as_str()
        );
    }
    Ok(ctx)
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn find_fresh_completed(
        &self,
        url: &str,
        max_age: Duration,
    ) -> Result<Option<WebsiteContext>> {
        let now = Utc::now();
        let records = self.read()?;
        Ok(records
            .values()
            .filter(|c| c.url == url && c.status == ContextStatus::Completed)
            .filter(|c| is_fresh(c.created_at, now, max_age))
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn create_processing(&self, url: &str, user_id: Option<&str>) -> Result<String> {
        let ctx = WebsiteContext::processing(url, user_id);
        let id = ctx.id.clone();
        self.write()?.insert(id.clone(), ctx);
        Ok(id)
    }

    async fn complete_with(&self, id: &str, payload: &ContextPayload) -> Result<()> {
        let mut records = self.write()?;
        let ctx = require_processing(&mut records, id)?;
        ctx.apply_payload(payload, Utc::now());
        Ok(())
    }

    async fn fail_with(&self, id: &str, message: &str) -> Result<()> {
        let mut records = self.write()?;
        let ctx = require_processing(&mut records, id)?;
        ctx.status = ContextStatus::Failed;
        ctx.error_message = Some(message.to_string());
        ctx.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<WebsiteContext>> {
        Ok(self.read()?.get(id).cloned())
    }
}
