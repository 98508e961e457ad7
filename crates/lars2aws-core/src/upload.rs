//! Streams planned artifacts from the catalog straight into object storage.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{info, warn};

use crate::http::HttpSource;
use crate::storage::{ObjectStore, PutRequest, SseSettings, content_type_for};
use crate::types::{ArtifactPlanItem, UploadResult};

/// Executes [`ArtifactPlanItem`]s. Every item produces its own
/// [`UploadResult`]; one failed item never aborts the others.
pub struct UploadExecutor {
    http: Arc<dyn HttpSource>,
    store: Arc<dyn ObjectStore>,
    sse: Option<SseSettings>,
    max_concurrency: usize,
}

impl UploadExecutor {
    pub fn new(
        http: Arc<dyn HttpSource>,
        store: Arc<dyn ObjectStore>,
        sse: Option<SseSettings>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            http,
            store,
            sse,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn upload_one(&self, item: &ArtifactPlanItem) -> UploadResult {
        let body = match self.http.get_stream(&item.source_url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(source = %item.source_url, error = %e, "artifact download failed");
                return UploadResult::failed(item, format!("download: {}", e));
            }
        };

        let request = PutRequest {
            bucket: item.destination_bucket.clone(),
            key: item.destination_key.clone(),
            content_type: content_type_for(&item.destination_key),
            metadata: item.metadata.clone(),
            sse: self.sse.clone(),
        };

        match self.store.put_stream(request, body).await {
            Ok(()) => {
                info!(
                    source = %item.source_url,
                    destination = %item.destination_uri(),
                    "artifact uploaded"
                );
                UploadResult::succeeded(item)
            }
            Err(e) => {
                warn!(
                    source = %item.source_url,
                    destination = %item.destination_uri(),
                    error = %e,
                    "artifact upload failed"
                );
                UploadResult::failed(item, format!("upload: {}", e))
            }
        }
    }

    /// Results come back in input order.
    pub async fn upload_many(&self, items: &[ArtifactPlanItem]) -> Vec<UploadResult> {
        let results: Vec<UploadResult> = futures::stream::iter(items)
            .map(|item| self.upload_one(item))
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|r| !r.ok).count();
        info!(total = results.len(), failed, "upload batch finished");
        results
    }
}
