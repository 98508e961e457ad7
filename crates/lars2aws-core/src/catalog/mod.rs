//! Catalog client: stream and build discovery from the LARS CSV index.
//!
//! Listings are read-through cached. Existence checks always go to the
//! network, so the two can disagree while a cached listing is still fresh.

pub mod filter;
pub mod page;
pub mod rows;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::config::CatalogConfig;
use crate::error::FetchError;
use crate::http::HttpSource;
use crate::types::BuildEntry;

pub use filter::{StreamPolicy, release_window, select_builds, select_streams};
pub use page::{Page, search_page};
pub use rows::{CatalogRow, parse_rows};

/// Source of "today" for the release window.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub struct CatalogClient {
    http: Arc<dyn HttpSource>,
    cache: Arc<dyn Cache>,
    config: CatalogConfig,
    clock: Clock,
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    pub fn new(http: Arc<dyn HttpSource>, cache: Arc<dyn Cache>, config: CatalogConfig) -> Self {
        Self {
            http,
            cache,
            config,
            clock: Arc::new(|| chrono::Local::now().date_naive()),
        }
    }

    /// Replace the wall clock used for the release window.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// `{base}/{path}/` with redundant slashes removed on both sides.
    pub fn catalog_url(&self, path: &str) -> String {
        format!(
            "{}/{}/",
            self.config.base_url.trim_end_matches('/'),
            path.trim_matches('/')
        )
    }

    /// Visible streams for `app`, cached under `streams:{app}`.
    pub async fn list_streams(&self, app: &str) -> anyhow::Result<Vec<String>> {
        let key = format!("streams:{}", app);
        if let Some(streams) = self.cached::<Vec<String>>(&key) {
            return Ok(streams);
        }

        let text = self
            .fetch_csv(app)
            .await
            .with_context(|| format!("Failed to list streams for {}", app))?;
        let rows = parse_rows(&text).with_context(|| format!("Bad stream listing for {}", app))?;

        let policy = StreamPolicy::for_application(app, (self.clock)());
        let streams = select_streams(&rows, &policy);

        self.store(&key, &streams, self.config.streams_ttl());
        info!(app, count = streams.len(), "streams loaded");
        Ok(streams)
    }

    /// Builds of `stream`, cached under `builds:{app}:{stream}`.
    pub async fn list_builds(&self, app: &str, stream: &str) -> anyhow::Result<Vec<BuildEntry>> {
        let key = format!("builds:{}:{}", app, stream);
        if let Some(builds) = self.cached::<Vec<BuildEntry>>(&key) {
            return Ok(builds);
        }

        let text = self
            .fetch_csv(&format!("{}/{}", app, stream))
            .await
            .with_context(|| format!("Failed to list builds for {}/{}", app, stream))?;
        let rows = parse_rows(&text)
            .with_context(|| format!("Bad build listing for {}/{}", app, stream))?;

        let builds = select_builds(&rows);

        self.store(&key, &builds, self.config.builds_ttl());
        info!(app, stream, count = builds.len(), "builds loaded");
        Ok(builds)
    }

    /// Live check that `{app}/{stream}/` answers with 2xx. Never fails.
    pub async fn stream_exists(&self, app: &str, stream: &str) -> bool {
        match self.fetch_csv(&format!("{}/{}", app, stream)).await {
            Ok(_) => true,
            Err(FetchError::Status { status, .. }) => {
                debug!(app, stream, status, "stream does not exist");
                false
            }
            Err(e) => {
                warn!(app, stream, error = %e, "stream existence check failed");
                false
            }
        }
    }

    /// GET a catalog document, retrying 429/5xx and transport errors with
    /// exponential backoff.
    pub async fn fetch_csv(&self, path: &str) -> Result<String, FetchError> {
        let url = self.catalog_url(path);
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut attempt: u32 = 0;

        loop {
            match self.http.get_text(&url, timeout).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.backoff(attempt);
                    debug!(url = %url, attempt, ?delay, error = %e, "retrying catalog fetch");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.backoff_ms.saturating_mul(1u64 << attempt.min(16)))
    }

    fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.cache.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "catalog cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.cache.set(key, raw, ttl),
            Err(e) => warn!(key, error = %e, "failed to serialize cache entry"),
        }
    }
}
