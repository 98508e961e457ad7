//! HTTP access to the catalog service.
//!
//! [`HttpSource`] is the seam the catalog client, the grid version lookup and
//! the upload executor consume. [`HttpFetcher`] implements it with reqwest.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};

use crate::error::FetchError;

/// Streamed response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

#[async_trait]
pub trait HttpSource: Send + Sync {
    /// GET `url` and return the body as text. Non-2xx is [`FetchError::Status`].
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;

    /// GET `url` and return the body as a stream without buffering it.
    async fn get_stream(&self, url: &str) -> Result<ByteStream, FetchError>;
}

/// reqwest-backed [`HttpSource`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// `connect_timeout` bounds connection setup; `read_timeout` bounds the
    /// gap between reads, so long artifact streams are not cut off.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lars2aws/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let mut request = self.client.get(parsed);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl HttpSource for HttpFetcher {
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let response = self.send(url, Some(timeout)).await?;
        response.text().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: format!("reading body: {}", e),
        })
    }

    async fn get_stream(&self, url: &str) -> Result<ByteStream, FetchError> {
        let response = self.send(url, None).await?;
        let owned_url = url.to_string();
        Ok(response
            .bytes_stream()
            .map_err(move |e| FetchError::Transport {
                url: owned_url.clone(),
                message: format!("reading body: {}", e),
            })
            .boxed())
    }
}
