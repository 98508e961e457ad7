//! S3-backed [`ObjectStore`].
//!
//! Bodies of at most one chunk go up as a single PutObject. Larger bodies
//! use a multipart upload with at most `max_concurrency` parts in flight, so
//! memory use is bounded by `chunk_size * max_concurrency` plus one read.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3 as s3;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream as S3Body, DateTimeFormat};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ServerSideEncryption};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{ListPage, ListRequest, ObjectHead, ObjectStore, ObjectSummary, PutRequest};
use crate::config::StorageConfig;
use crate::error::{FetchError, StoreError};
use crate::http::ByteStream;

/// S3 rejects non-final parts smaller than this.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: s3::Client,
    chunk_size: usize,
    max_concurrency: usize,
}

impl S3ObjectStore {
    pub fn new(client: s3::Client, chunk_size: usize, max_concurrency: usize) -> Self {
        Self {
            client,
            chunk_size: chunk_size.max(MIN_PART_SIZE),
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Client from the default credential chain in the configured region.
    pub async fn from_config(config: &StorageConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        Self::new(
            s3::Client::new(&sdk_config),
            config.chunk_size_bytes(),
            config.max_concurrency,
        )
    }

    async fn put_single(&self, request: &PutRequest, data: Bytes) -> Result<(), StoreError> {
        let sse = request.sse.as_ref();
        self.client
            .put_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .body(S3Body::from(data))
            .set_content_type(request.content_type.map(str::to_string))
            .set_metadata(request.metadata.as_ref().map(to_hash_map))
            .set_server_side_encryption(sse.map(|s| ServerSideEncryption::from(s.mode.as_str())))
            .set_ssekms_key_id(sse.and_then(|s| s.kms_key_id.clone()))
            .send()
            .await
            .map_err(|e| request_error("PutObject", request, e))?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        request: &PutRequest,
        first: Bytes,
        reader: &mut ChunkReader,
    ) -> Result<(), StoreError> {
        let sse = request.sse.as_ref();
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&request.bucket)
            .key(&request.key)
            .set_content_type(request.content_type.map(str::to_string))
            .set_metadata(request.metadata.as_ref().map(to_hash_map))
            .set_server_side_encryption(sse.map(|s| ServerSideEncryption::from(s.mode.as_str())))
            .set_ssekms_key_id(sse.and_then(|s| s.kms_key_id.clone()))
            .send()
            .await
            .map_err(|e| request_error("CreateMultipartUpload", request, e))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::Request {
                operation: "CreateMultipartUpload",
                bucket: request.bucket.clone(),
                key: request.key.clone(),
                message: "response carried no upload id".to_string(),
            })?
            .to_string();

        match self.upload_parts(request, &upload_id, first, reader).await {
            Ok(parts) => {
                debug!(bucket = %request.bucket, key = %request.key, parts = parts.len(), "completing multipart upload");
                self.client
                    .complete_multipart_upload()
                    .bucket(&request.bucket)
                    .key(&request.key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| request_error("CompleteMultipartUpload", request, e))?;
                Ok(())
            }
            Err(e) => {
                // Parts already stored are billed until the upload is aborted.
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&request.bucket)
                    .key(&request.key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        bucket = %request.bucket,
                        key = %request.key,
                        error = %DisplayErrorContext(&abort),
                        "failed to abort multipart upload"
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        request: &PutRequest,
        upload_id: &str,
        first: Bytes,
        reader: &mut ChunkReader,
    ) -> Result<Vec<CompletedPart>, StoreError> {
        let mut in_flight: JoinSet<Result<CompletedPart, StoreError>> = JoinSet::new();
        let mut completed = Vec::new();
        let mut part_number: i32 = 1;
        let mut next = Some(first);

        while let Some(chunk) = next.take() {
            while in_flight.len() >= self.max_concurrency {
                completed.push(join_part(&mut in_flight, request).await?);
            }
            in_flight.spawn(upload_part(
                self.client.clone(),
                request.bucket.clone(),
                request.key.clone(),
                upload_id.to_string(),
                part_number,
                chunk,
            ));
            part_number += 1;
            next = reader
                .next_chunk()
                .await
                .map_err(|source| body_error(request, source))?;
        }

        while !in_flight.is_empty() {
            completed.push(join_part(&mut in_flight, request).await?);
        }
        completed.sort_by_key(|part| part.part_number());
        Ok(completed)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_stream(&self, request: PutRequest, body: ByteStream) -> Result<(), StoreError> {
        let mut reader = ChunkReader::new(body, self.chunk_size);
        let first = reader
            .next_chunk()
            .await
            .map_err(|source| body_error(&request, source))?
            .unwrap_or_default();

        if reader.is_exhausted() {
            self.put_single(&request, first).await
        } else {
            self.put_multipart(&request, first, &mut reader).await
        }
    }

    async fn list_page(&self, request: &ListRequest) -> Result<ListPage, StoreError> {
        let out = self
            .client
            .list_objects_v2()
            .bucket(&request.bucket)
            .prefix(&request.prefix)
            .set_delimiter(request.delimiter.clone())
            .set_continuation_token(request.continuation_token.clone())
            .send()
            .await
            .map_err(|e| StoreError::Request {
                operation: "ListObjectsV2",
                bucket: request.bucket.clone(),
                key: request.prefix.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let objects = out
            .contents()
            .iter()
            .filter_map(|object| {
                object.key().map(|key| ObjectSummary {
                    key: key.to_string(),
                    size: object.size(),
                })
            })
            .collect();
        let common_prefixes = out
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();
        let next_continuation_token = if out.is_truncated().unwrap_or(false) {
            out.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            common_prefixes,
            next_continuation_token,
        })
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, StoreError> {
        let out = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    StoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StoreError::Request {
                        operation: "HeadObject",
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                        message: DisplayErrorContext(&e).to_string(),
                    }
                }
            })?;

        Ok(ObjectHead {
            content_length: out.content_length(),
            content_type: out.content_type().map(str::to_string),
            last_modified: out
                .last_modified()
                .and_then(|d| d.fmt(DateTimeFormat::DateTime).ok()),
            metadata: out
                .metadata()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_else(BTreeMap::new),
        })
    }
}

async fn upload_part(
    client: s3::Client,
    bucket: String,
    key: String,
    upload_id: String,
    part_number: i32,
    data: Bytes,
) -> Result<CompletedPart, StoreError> {
    let size = data.len();
    let out = client
        .upload_part()
        .bucket(&bucket)
        .key(&key)
        .upload_id(&upload_id)
        .part_number(part_number)
        .body(S3Body::from(data))
        .send()
        .await
        .map_err(|e| StoreError::Request {
            operation: "UploadPart",
            bucket: bucket.clone(),
            key: key.clone(),
            message: format!("part {}: {}", part_number, DisplayErrorContext(&e)),
        })?;
    debug!(bucket = %bucket, key = %key, part_number, size, "part uploaded");

    Ok(CompletedPart::builder()
        .set_e_tag(out.e_tag().map(str::to_string))
        .part_number(part_number)
        .build())
}

async fn join_part(
    in_flight: &mut JoinSet<Result<CompletedPart, StoreError>>,
    request: &PutRequest,
) -> Result<CompletedPart, StoreError> {
    match in_flight.join_next().await {
        Some(Ok(result)) => result,
        Some(Err(join)) => Err(StoreError::Request {
            operation: "UploadPart",
            bucket: request.bucket.clone(),
            key: request.key.clone(),
            message: format!("part task failed: {}", join),
        }),
        None => Err(StoreError::Request {
            operation: "UploadPart",
            bucket: request.bucket.clone(),
            key: request.key.clone(),
            message: "no part in flight".to_string(),
        }),
    }
}

/// Re-slices an arbitrary byte stream into fixed-size chunks.
struct ChunkReader {
    body: ByteStream,
    buffer: BytesMut,
    chunk_size: usize,
    finished: bool,
}

impl ChunkReader {
    fn new(body: ByteStream, chunk_size: usize) -> Self {
        Self {
            body,
            buffer: BytesMut::new(),
            chunk_size,
            finished: false,
        }
    }

    /// Reads past a full chunk until more data or the end shows up, so a
    /// body ending on a chunk boundary is already exhausted afterwards.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, FetchError> {
        while self.buffer.len() <= self.chunk_size && !self.finished {
            match self.body.next().await {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => return Err(e),
                None => self.finished = true,
            }
        }
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let take = self.chunk_size.min(self.buffer.len());
        Ok(Some(self.buffer.split_to(take).freeze()))
    }

    /// True once the body ended and every byte was handed out.
    fn is_exhausted(&self) -> bool {
        self.finished && self.buffer.is_empty()
    }
}

fn to_hash_map(metadata: &BTreeMap<String, String>) -> HashMap<String, String> {
    metadata
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn request_error<E>(operation: &'static str, request: &PutRequest, e: E) -> StoreError
where
    E: std::error::Error,
{
    StoreError::Request {
        operation,
        bucket: request.bucket.clone(),
        key: request.key.clone(),
        message: DisplayErrorContext(&e).to_string(),
    }
}

fn body_error(request: &PutRequest, source: FetchError) -> StoreError {
    StoreError::Body {
        bucket: request.bucket.clone(),
        key: request.key.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use aws_sdk_s3::config::http::{HttpRequest, HttpResponse};
    use aws_sdk_s3::config::retry::RetryConfig;
    use aws_sdk_s3::config::{
        Credentials, RequestChecksumCalculation, RuntimeComponents, StalledStreamProtectionConfig,
    };
    use aws_sdk_s3::primitives::SdkBody;
    use aws_smithy_runtime_api::client::http::{
        HttpClient, HttpConnector, HttpConnectorFuture, HttpConnectorSettings,
        SharedHttpConnector,
    };
    use aws_smithy_runtime_api::client::result::ConnectorError;
    use aws_smithy_runtime_api::http::StatusCode;
    use futures::stream;

    fn body(parts: Vec<&'static [u8]>) -> ByteStream {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p)))).boxed()
    }

    #[tokio::test]
    async fn chunk_reader_reslices_stream() {
        let mut reader = ChunkReader::new(body(vec![b"ab", b"cde", b"f"]), 4);
        assert_eq!(reader.next_chunk().await.unwrap().unwrap(), Bytes::from_static(b"abcd"));
        assert!(!reader.is_exhausted());
        assert_eq!(reader.next_chunk().await.unwrap().unwrap(), Bytes::from_static(b"ef"));
        assert!(reader.is_exhausted());
        assert_eq!(reader.next_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn small_body_is_exhausted_after_first_chunk() {
        let mut reader = ChunkReader::new(body(vec![b"abc"]), 4);
        assert_eq!(reader.next_chunk().await.unwrap().unwrap().len(), 3);
        assert!(reader.is_exhausted());
    }

    #[tokio::test]
    async fn exact_chunk_is_exhausted_after_first_chunk() {
        let mut reader = ChunkReader::new(body(vec![b"ab", b"cd"]), 4);
        assert_eq!(reader.next_chunk().await.unwrap().unwrap(), Bytes::from_static(b"abcd"));
        assert!(reader.is_exhausted());
    }

    #[tokio::test]
    async fn empty_body_yields_nothing() {
        let mut reader = ChunkReader::new(body(vec![]), 4);
        assert_eq!(reader.next_chunk().await.unwrap(), None);
        assert!(reader.is_exhausted());
    }

    #[tokio::test]
    async fn body_errors_surface() {
        let failing: ByteStream = stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(FetchError::Transport {
                url: "http://lars/x".into(),
                message: "reset".into(),
            }),
        ])
        .boxed();
        let mut reader = ChunkReader::new(failing, 4);
        assert!(reader.next_chunk().await.is_err());
    }

    /// One request as seen by [`FakeS3`]. Sizes are body lengths.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Put(usize),
        Create,
        Part(i32, usize),
        Complete(Vec<i32>),
        Abort,
    }

    #[derive(Debug, Default)]
    struct S3State {
        calls: Mutex<Vec<Call>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        failing_part: Option<i32>,
    }

    /// Minimal S3 endpoint behind the SDK's HTTP client seam.
    #[derive(Debug, Clone, Default)]
    struct FakeS3(Arc<S3State>);

    impl FakeS3 {
        fn failing_part(part: i32) -> Self {
            Self(Arc::new(S3State {
                failing_part: Some(part),
                ..Default::default()
            }))
        }

        fn calls(&self) -> Vec<Call> {
            self.0.calls.lock().unwrap().clone()
        }

        fn peak_in_flight(&self) -> usize {
            self.0.peak_in_flight.load(Ordering::SeqCst)
        }

        fn store(&self, chunk_size: usize, max_concurrency: usize) -> S3ObjectStore {
            let config = s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new("us-east-1"))
                .credentials_provider(Credentials::new("AKID", "SECRET", None, None, "test"))
                .endpoint_url("http://s3.test")
                .force_path_style(true)
                .retry_config(RetryConfig::disabled())
                .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
                .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
                .http_client(self.clone())
                .build();
            // Bypasses the 5 MiB floor so parts stay tiny.
            S3ObjectStore {
                client: s3::Client::from_conf(config),
                chunk_size,
                max_concurrency,
            }
        }
    }

    impl HttpClient for FakeS3 {
        fn http_connector(
            &self,
            _: &HttpConnectorSettings,
            _: &RuntimeComponents,
        ) -> SharedHttpConnector {
            SharedHttpConnector::new(self.clone())
        }
    }

    impl HttpConnector for FakeS3 {
        fn call(&self, request: HttpRequest) -> HttpConnectorFuture {
            let state = self.0.clone();
            HttpConnectorFuture::new(async move {
                Ok::<_, ConnectorError>(state.respond(request).await)
            })
        }
    }

    impl S3State {
        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        async fn respond(&self, request: HttpRequest) -> HttpResponse {
            let uri = request.uri().to_string();
            match request.method() {
                "PUT" if uri.contains("partNumber=") => {
                    let part = query_value(&uri, "partNumber")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    self.record(Call::Part(part, body_len(&request)));

                    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);

                    if self.failing_part == Some(part) {
                        return xml(
                            403,
                            "<Error><Code>AccessDenied</Code><Message>denied</Message></Error>",
                        );
                    }
                    with_etag(format!("\"etag-{}\"", part))
                }
                "PUT" => {
                    self.record(Call::Put(body_len(&request)));
                    with_etag("\"etag\"".to_string())
                }
                "POST" if uri.contains("?uploads") => {
                    self.record(Call::Create);
                    xml(
                        200,
                        "<InitiateMultipartUploadResult><Bucket>migops</Bucket>\
                         <Key>LARS/x.jar</Key><UploadId>up-1</UploadId>\
                         </InitiateMultipartUploadResult>",
                    )
                }
                "POST" => {
                    let body = request
                        .body()
                        .bytes()
                        .map(String::from_utf8_lossy)
                        .unwrap_or_default();
                    self.record(Call::Complete(part_numbers(&body)));
                    xml(
                        200,
                        "<CompleteMultipartUploadResult><Bucket>migops</Bucket>\
                         <Key>LARS/x.jar</Key><ETag>\"etag\"</ETag>\
                         </CompleteMultipartUploadResult>",
                    )
                }
                "DELETE" => {
                    self.record(Call::Abort);
                    xml(204, "")
                }
                _ => xml(405, ""),
            }
        }
    }

    fn query_value<'a>(uri: &'a str, name: &str) -> Option<&'a str> {
        let (_, query) = uri.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    fn body_len(request: &HttpRequest) -> usize {
        let headers = request.headers();
        headers
            .get("x-amz-decoded-content-length")
            .or_else(|| headers.get("content-length"))
            .and_then(|v| v.parse().ok())
            .or_else(|| request.body().bytes().map(<[u8]>::len))
            .unwrap_or(0)
    }

    /// `<PartNumber>` values in document order.
    fn part_numbers(body: &str) -> Vec<i32> {
        body.split("<PartNumber>")
            .skip(1)
            .filter_map(|rest| rest.split_once("</PartNumber>"))
            .filter_map(|(number, _)| number.trim().parse().ok())
            .collect()
    }

    fn xml(status: u16, body: &str) -> HttpResponse {
        HttpResponse::new(
            StatusCode::try_from(status).unwrap(),
            SdkBody::from(body.to_string()),
        )
    }

    fn with_etag(etag: String) -> HttpResponse {
        let mut response = xml(200, "");
        response.headers_mut().insert("etag", etag);
        response
    }

    fn put_request() -> PutRequest {
        PutRequest {
            bucket: "migops".into(),
            key: "LARS/x.jar".into(),
            content_type: Some("application/java-archive"),
            metadata: None,
            sse: None,
        }
    }

    fn parts_of(calls: &[Call]) -> Vec<(i32, usize)> {
        let mut parts: Vec<(i32, usize)> = calls
            .iter()
            .filter_map(|call| match call {
                Call::Part(number, size) => Some((*number, *size)),
                _ => None,
            })
            .collect();
        parts.sort();
        parts
    }

    #[tokio::test]
    async fn body_of_two_and_a_half_chunks_uploads_three_parts() {
        let s3 = FakeS3::default();
        let store = s3.store(4, 2);

        store
            .put_stream(put_request(), body(vec![b"abc", b"defgh", b"ij"]))
            .await
            .unwrap();

        let calls = s3.calls();
        assert_eq!(calls.first(), Some(&Call::Create));
        assert_eq!(calls.last(), Some(&Call::Complete(vec![1, 2, 3])));
        assert_eq!(parts_of(&calls), vec![(1, 4), (2, 4), (3, 2)]);
        assert!(!calls.contains(&Call::Abort));
        assert!(!calls.iter().any(|call| matches!(call, Call::Put(_))));
    }

    #[tokio::test]
    async fn failed_part_aborts_the_upload() {
        let s3 = FakeS3::failing_part(2);
        let store = s3.store(4, 2);

        let err = store
            .put_stream(put_request(), body(vec![b"abcdefghijkl"]))
            .await
            .unwrap_err();

        match err {
            StoreError::Request { operation, key, .. } => {
                assert_eq!(operation, "UploadPart");
                assert_eq!(key, "LARS/x.jar");
            }
            other => panic!("expected request error, got {other:?}"),
        }
        let calls = s3.calls();
        assert_eq!(calls.last(), Some(&Call::Abort));
        assert!(!calls.iter().any(|call| matches!(call, Call::Complete(_))));
    }

    #[tokio::test]
    async fn parts_in_flight_never_exceed_max_concurrency() {
        let s3 = FakeS3::default();
        let store = s3.store(4, 2);

        store
            .put_stream(put_request(), body(vec![b"aaaabbbbccccddddeeeeffff"]))
            .await
            .unwrap();

        assert_eq!(parts_of(&s3.calls()).len(), 6);
        assert_eq!(s3.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn serial_store_uploads_one_part_at_a_time() {
        let s3 = FakeS3::default();
        let store = s3.store(4, 1);

        store
            .put_stream(put_request(), body(vec![b"aaaabbbbcc"]))
            .await
            .unwrap();

        assert_eq!(parts_of(&s3.calls()).len(), 3);
        assert_eq!(s3.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn body_of_exactly_one_chunk_is_a_single_put() {
        let s3 = FakeS3::default();
        let store = s3.store(4, 2);

        store
            .put_stream(put_request(), body(vec![b"ab", b"cd"]))
            .await
            .unwrap();

        assert_eq!(s3.calls(), vec![Call::Put(4)]);
    }

    #[tokio::test]
    async fn small_and_empty_bodies_are_single_puts() {
        let s3 = FakeS3::default();
        let store = s3.store(4, 2);

        store
            .put_stream(put_request(), body(vec![b"abc"]))
            .await
            .unwrap();
        store.put_stream(put_request(), body(vec![])).await.unwrap();

        assert_eq!(s3.calls(), vec![Call::Put(3), Call::Put(0)]);
    }
}
