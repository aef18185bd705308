//! Headless Chromium fetch strategy (cargo feature `browser`).
//!
//! The browser is launched lazily on the first fetch and reused. Each fetch
//! opens a fresh tab, waits for navigation, reads the rendered DOM, and
//! closes the tab whether or not extraction succeeded. A fetch dropped
//! mid-flight (for example by the fetch timeout) still closes its tab from
//! [`TabGuard`]'s `Drop`. A non-2xx document response fails the fetch so the
//! HTTP fallback gets a chance.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ScrapeConfig;
use crate::extract::extract_rendered;
use crate::fetch::{ensure_success_status, FetchStrategy, StrategyOutput};

pub struct BrowserFetcher {
    user_agent: String,
    content_cap: usize,
    browser: Mutex<Option<Arc<Browser>>>,
}

impl BrowserFetcher {
    pub fn new(config: &ScrapeConfig, content_cap: usize) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            content_cap,
            browser: Mutex::new(None),
        }
    }

    async fn browser(&self) -> Result<Arc<Browser>> {
        let mut slot = self.browser.lock().await;
        if let Some(browser) = slot.as_ref() {
            return Ok(browser.clone());
        }

        info!("launching headless browser");
        let config = BrowserConfig::builder()
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let browser = Arc::new(browser);
        *slot = Some(browser.clone());
        Ok(browser)
    }

    async fn render(&self, page: &Page, url: &str) -> Result<String> {
        page.execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await?;
        page.goto(url)
            .await
            .with_context(|| format!("Navigation failed for {}", url))?;
        let request = page.wait_for_navigation_response().await?;
        let status = request
            .as_ref()
            .and_then(|req| req.response.as_ref())
            .map(|resp| resp.status);
        ensure_success_status(url, status)?;
        Ok(page.content().await?)
    }
}

/// Owns a tab and closes it on drop unless [`close`](Self::close) ran first.
struct TabGuard(Option<Page>);

impl TabGuard {
    async fn close(mut self) {
        if let Some(page) = self.0.take() {
            if let Err(e) = page.close().await {
                warn!(error = %e, "failed to close browser tab");
            }
        }
    }
}

impl Drop for TabGuard {
    fn drop(&mut self) {
        let Some(page) = self.0.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = page.close().await;
            });
        }
    }
}

#[async_trait]
impl FetchStrategy for BrowserFetcher {
    fn name(&self) -> &str {
        "browser"
    }

    async fn fetch(&self, url: &str) -> Result<StrategyOutput> {
        let browser = self.browser().await?;
        let page = browser.new_page("about:blank").await?;
        let tab = TabGuard(Some(page.clone()));

        let result = self.render(&page, url).await;
        tab.close().await;
        let html = result?;

        debug!(url, bytes = html.len(), "rendered page");
        Ok(StrategyOutput {
            raw_html_length: html.len(),
            extracted: extract_rendered(&html, self.content_cap),
        })
    }
}
