//! Schema for lars2aws.toml.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CATALOG_BASE_URL: &str = "https://builds.lawson.com/lars/util/get";
pub const DEFAULT_BUCKET: &str = "migops";
pub const DEFAULT_ROOT: &str = "LARS/";
pub const DEFAULT_REGION: &str = "us-east-1";
/// S3 accepts parts of 5 MiB up to 5 GiB.
pub const MIN_CHUNK_MB: u64 = 5;
pub const MAX_CHUNK_MB: u64 = 5 * 1024;
pub const DEFAULT_DEST_DIR: &str = "/opt/infor/landmark/tmp";
pub const DEFAULT_LISTING_FILTER: &str =
    r"Install-.*\.jar|mt_dependencies\.txt|MIG_scripts\.jar|LANDMARK\.jar|grid-installer\.jar";
pub const DEFAULT_PRECLEAR: [&str; 6] = [
    "Install-LMMIG.jar",
    "Install-LMHCM.jar",
    "Install-LMIEFIN.jar",
    "LANDMARK.jar",
    "grid-installer.jar",
    "mt_dependencies.txt",
];

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Lars2AwsConfig {
    pub catalog: CatalogConfig,
    pub storage: StorageConfig,
    pub inject: InjectConfig,
}

/// Catalog (LARS) access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub streams_ttl_secs: u64,
    pub builds_ttl_secs: u64,
    /// Connect and read timeout for CSV listings.
    pub timeout_secs: u64,
    /// Retries after the first attempt on 429/5xx.
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            streams_ttl_secs: 1800,
            builds_ttl_secs: 900,
            timeout_secs: 10,
            max_retries: 3,
            backoff_ms: 300,
        }
    }
}

impl CatalogConfig {
    pub fn streams_ttl(&self) -> Duration {
        Duration::from_secs(self.streams_ttl_secs)
    }

    pub fn builds_ttl(&self) -> Duration {
        Duration::from_secs(self.builds_ttl_secs)
    }
}

/// Server-side encryption applied to every uploaded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SseMode {
    #[serde(rename = "AES256")]
    Aes256,
    #[serde(rename = "aws:kms")]
    Kms,
}

impl SseMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "AES256" => Some(Self::Aes256),
            "aws:kms" => Some(Self::Kms),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aes256 => "AES256",
            Self::Kms => "aws:kms",
        }
    }
}

/// Object storage destination and transfer tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    /// Namespace browsed by the prefix index and used by injections.
    pub root: String,
    pub multipart_chunk_mb: u64,
    pub max_concurrency: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sse: Option<SseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            region: DEFAULT_REGION.to_string(),
            root: DEFAULT_ROOT.to_string(),
            multipart_chunk_mb: 16,
            max_concurrency: 4,
            sse: None,
            kms_key_id: None,
        }
    }
}

impl StorageConfig {
    /// Part size in bytes, saturating at `usize::MAX`.
    pub fn chunk_size_bytes(&self) -> usize {
        usize::try_from(self.multipart_chunk_mb)
            .unwrap_or(usize::MAX)
            .saturating_mul(1024 * 1024)
    }
}

/// Remote injection defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectConfig {
    pub dest_dir: String,
    pub preclear: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<String>,
    pub login_shell: bool,
    pub poll_interval_secs: u64,
    pub poll_max_attempts: u32,
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            dest_dir: DEFAULT_DEST_DIR.to_string(),
            preclear: DEFAULT_PRECLEAR.iter().map(|s| s.to_string()).collect(),
            listing_filter: Some(DEFAULT_LISTING_FILTER.to_string()),
            run_as_user: Some("lawson".to_string()),
            login_shell: false,
            poll_interval_secs: 2,
            poll_max_attempts: 150,
        }
    }
}

impl Lars2AwsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply environment overrides using the variable names the deployment
    /// already exports (`LARS_BASE_URL`, `S3_BUCKET`, ...).
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LARS_BASE_URL") {
            self.catalog.base_url = v;
        }
        if let Some(v) = lookup("LARS_STREAMS_TTL") {
            self.catalog.streams_ttl_secs = parse_number("LARS_STREAMS_TTL", &v)?;
        }
        if let Some(v) = lookup("LARS_BUILDS_TTL") {
            self.catalog.builds_ttl_secs = parse_number("LARS_BUILDS_TTL", &v)?;
        }
        if let Some(v) = lookup("S3_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = lookup("AWS_REGION") {
            self.storage.region = v;
        }
        if let Some(v) = lookup("S3_MULTIPART_CHUNK_MB") {
            self.storage.multipart_chunk_mb = parse_number("S3_MULTIPART_CHUNK_MB", &v)?;
        }
        if let Some(v) = lookup("S3_MAX_CONCURRENCY") {
            self.storage.max_concurrency = parse_number("S3_MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("S3_SSE") {
            self.storage.sse = if v.trim().is_empty() {
                None
            } else {
                Some(SseMode::parse(&v).ok_or_else(|| {
                    anyhow::anyhow!("S3_SSE must be 'AES256' or 'aws:kms', got '{}'", v)
                })?)
            };
        }
        if let Some(v) = lookup("S3_KMS_KEY_ID") {
            self.storage.kms_key_id = Some(v).filter(|s| !s.trim().is_empty());
        }
        Ok(())
    }

    pub fn apply_process_env(&mut self) -> anyhow::Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a number, got '{}'", key, value))
}
