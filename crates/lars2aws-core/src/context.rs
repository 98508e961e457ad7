//! Application context for unified dependency injection.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, MemoryCache};
use crate::catalog::CatalogClient;
use crate::config::Lars2AwsConfig;
use crate::http::{HttpFetcher, HttpSource};
use crate::index::PrefixIndexer;
use crate::inject::{PollPolicy, RemoteExec, RemoteInjector, SsmRemoteExec};
use crate::plan::{PlanBuilder, Planner};
use crate::storage::{ObjectStore, S3ObjectStore, SseSettings};
use crate::upload::UploadExecutor;

/// Idle gap allowed while streaming an artifact body.
pub const ARTIFACT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Unified application context for dependency injection.
///
/// Holds the configuration and the shared capability clients. Frontends
/// create this once and ask it for the services a command needs.
#[derive(Clone)]
pub struct AppContext {
    config: Lars2AwsConfig,
    http: Arc<dyn HttpSource>,
    cache: Arc<dyn Cache>,
    store: Arc<dyn ObjectStore>,
    exec: Arc<dyn RemoteExec>,
}

impl AppContext {
    /// Build the production clients: reqwest, S3 and SSM in the configured
    /// region, plus an in-process cache.
    pub async fn from_config(config: Lars2AwsConfig) -> anyhow::Result<Self> {
        let http = HttpFetcher::new(
            Duration::from_secs(config.catalog.timeout_secs),
            ARTIFACT_READ_TIMEOUT,
        )?;
        let store = S3ObjectStore::from_config(&config.storage).await;
        let exec = SsmRemoteExec::from_region(&config.storage.region).await;

        Ok(Self::with_services(
            config,
            Arc::new(http),
            Arc::new(MemoryCache::new()),
            Arc::new(store),
            Arc::new(exec),
        ))
    }

    /// Create a context around explicit capability implementations.
    pub fn with_services(
        config: Lars2AwsConfig,
        http: Arc<dyn HttpSource>,
        cache: Arc<dyn Cache>,
        store: Arc<dyn ObjectStore>,
        exec: Arc<dyn RemoteExec>,
    ) -> Self {
        Self {
            config,
            http,
            cache,
            store,
            exec,
        }
    }

    pub fn config(&self) -> &Lars2AwsConfig {
        &self.config
    }

    pub fn bucket(&self) -> &str {
        &self.config.storage.bucket
    }

    pub fn root(&self) -> &str {
        &self.config.storage.root
    }

    pub fn catalog_client(&self) -> CatalogClient {
        CatalogClient::new(
            self.http.clone(),
            self.cache.clone(),
            self.config.catalog.clone(),
        )
    }

    pub fn plan_builder(&self) -> PlanBuilder {
        PlanBuilder::new(
            self.config.catalog.base_url.clone(),
            self.config.storage.bucket.clone(),
        )
    }

    pub fn planner(&self) -> Planner {
        Planner::new(self.plan_builder(), self.http.clone())
    }

    pub fn upload_executor(&self) -> UploadExecutor {
        UploadExecutor::new(
            self.http.clone(),
            self.store.clone(),
            SseSettings::from_config(&self.config.storage),
            self.config.storage.max_concurrency,
        )
    }

    pub fn prefix_indexer(&self) -> PrefixIndexer {
        PrefixIndexer::new(self.store.clone())
    }

    pub fn remote_injector(&self) -> RemoteInjector {
        RemoteInjector::new(self.exec.clone(), self.config.inject.clone())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::from_config(&self.config.inject)
    }
}
