//! Object storage seam: streaming put, paginated listing, HEAD.

pub mod s3;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{SseMode, StorageConfig};
use crate::error::StoreError;
use crate::http::ByteStream;
use crate::types::ArtifactMetadata;

pub use s3::S3ObjectStore;

/// Server-side encryption settings applied to a put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseSettings {
    pub mode: SseMode,
    /// Only sent with [`SseMode::Kms`].
    pub kms_key_id: Option<String>,
}

impl SseSettings {
    pub fn from_config(config: &StorageConfig) -> Option<Self> {
        config.sse.map(|mode| Self {
            mode,
            kms_key_id: match mode {
                SseMode::Kms => config.kms_key_id.clone(),
                SseMode::Aes256 => None,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    pub bucket: String,
    pub key: String,
    pub content_type: Option<&'static str>,
    pub metadata: Option<ArtifactMetadata>,
    pub sse: Option<SseSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub bucket: String,
    pub prefix: String,
    pub delimiter: Option<String>,
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    pub next_continuation_token: Option<String>,
}

/// Result of a HEAD request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectHead {
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` to `request.key`, replacing any existing object.
    async fn put_stream(&self, request: PutRequest, body: ByteStream) -> Result<(), StoreError>;

    async fn list_page(&self, request: &ListRequest) -> Result<ListPage, StoreError>;

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, StoreError>;
}

/// Follow continuation tokens until the listing is exhausted.
pub async fn list_all(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    delimiter: Option<&str>,
) -> Result<ListPage, StoreError> {
    let mut request = ListRequest {
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
        delimiter: delimiter.map(str::to_string),
        continuation_token: None,
    };
    let mut all = ListPage::default();

    loop {
        let page = store.list_page(&request).await?;
        all.objects.extend(page.objects);
        all.common_prefixes.extend(page.common_prefixes);
        match page.next_continuation_token {
            Some(token) => request.continuation_token = Some(token),
            None => break,
        }
    }
    Ok(all)
}

/// Content-Type for an artifact, from its name alone.
pub fn content_type_for(name: &str) -> Option<&'static str> {
    if name.ends_with(".jar") {
        Some("application/java-archive")
    } else if name.ends_with(".txt") {
        Some("text/plain")
    } else {
        None
    }
}
