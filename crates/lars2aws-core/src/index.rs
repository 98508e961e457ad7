//! Two-level browse view over the artifact namespace.
//!
//! Keys of the resulting [`PrefixIndex`] are the root itself (`LARS/`),
//! categories (`MT/`) and subcategories (`MT/AUG/`). Values are file paths
//! relative to that key.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info};

use crate::storage::{ObjectHead, ObjectStore, list_all};

pub type PrefixIndex = BTreeMap<String, Vec<String>>;

/// `version` metadata of one landed artifact plus its basic attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectVersionMeta {
    pub key: String,
    pub version: Option<String>,
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
}

impl ObjectVersionMeta {
    fn from_head(key: String, head: ObjectHead) -> Self {
        Self {
            version: head.metadata.get("version").cloned(),
            content_length: head.content_length,
            content_type: head.content_type,
            last_modified: head.last_modified,
            key,
        }
    }
}

pub struct PrefixIndexer {
    store: Arc<dyn ObjectStore>,
}

impl PrefixIndexer {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn build_index(&self, bucket: &str, root: &str) -> anyhow::Result<PrefixIndex> {
        let root = normalize_root(root);
        let mut index = PrefixIndex::new();

        let top = list_all(self.store.as_ref(), bucket, &root, Some("/"))
            .await
            .with_context(|| format!("Failed to list s3://{}/{}", bucket, root))?;
        index.insert(
            root.clone(),
            relative_files(top.objects.iter().map(|o| o.key.as_str()), &root),
        );

        for category in &top.common_prefixes {
            let listing = list_all(self.store.as_ref(), bucket, category, Some("/"))
                .await
                .with_context(|| format!("Failed to list s3://{}/{}", bucket, category))?;
            insert_non_empty(
                &mut index,
                strip_root(category, &root),
                relative_files(listing.objects.iter().map(|o| o.key.as_str()), category),
            );

            for sub in &listing.common_prefixes {
                let nested = list_all(self.store.as_ref(), bucket, sub, None)
                    .await
                    .with_context(|| format!("Failed to list s3://{}/{}", bucket, sub))?;
                insert_non_empty(
                    &mut index,
                    strip_root(sub, &root),
                    relative_files(nested.objects.iter().map(|o| o.key.as_str()), sub),
                );
            }
        }

        info!(bucket, root = %root, prefixes = index.len(), "prefix index built");
        Ok(index)
    }

    /// HEAD `{root}{rel_key}` and report its `version` metadata.
    pub async fn object_version(
        &self,
        bucket: &str,
        root: &str,
        rel_key: &str,
    ) -> anyhow::Result<ObjectVersionMeta> {
        let key = format!("{}{}", normalize_root(root), rel_key.trim_start_matches('/'));
        let head = self
            .store
            .head(bucket, &key)
            .await
            .with_context(|| format!("Failed to read metadata of s3://{}/{}", bucket, key))?;
        debug!(bucket, key = %key, "object metadata read");
        Ok(ObjectVersionMeta::from_head(key, head))
    }
}

fn normalize_root(root: &str) -> String {
    let trimmed = root.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

fn strip_root(prefix: &str, root: &str) -> String {
    prefix.strip_prefix(root).unwrap_or(prefix).to_string()
}

/// Paths under `prefix`, without folder markers, sorted.
fn relative_files<'a>(keys: impl Iterator<Item = &'a str>, prefix: &str) -> Vec<String> {
    let mut files: Vec<String> = keys
        .filter(|key| !key.ends_with('/'))
        .filter_map(|key| key.strip_prefix(prefix))
        .filter(|rel| !rel.is_empty())
        .map(str::to_string)
        .collect();
    files.sort();
    files
}

fn insert_non_empty(index: &mut PrefixIndex, key: String, files: Vec<String>) {
    if !files.is_empty() {
        index.insert(key, files);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_normalized() {
        assert_eq!(normalize_root("LARS"), "LARS/");
        assert_eq!(normalize_root("/LARS/"), "LARS/");
        assert_eq!(normalize_root(""), "");
    }

    #[test]
    fn folder_markers_are_dropped() {
        let keys = ["LARS/MT/", "LARS/MT/b.jar", "LARS/MT/a.jar"];
        assert_eq!(
            relative_files(keys.into_iter(), "LARS/MT/"),
            vec!["a.jar".to_string(), "b.jar".to_string()]
        );
    }
}
