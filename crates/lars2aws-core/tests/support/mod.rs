#![allow(dead_code)]

//! In-memory fakes of the capability traits.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use lars2aws_core::config::{CatalogConfig, InjectConfig};
use lars2aws_core::error::{FetchError, RemoteError, StoreError};
use lars2aws_core::http::{ByteStream, HttpSource};
use lars2aws_core::inject::{CommandStatus, RemoteCommand, RemoteExec, SendCommand};
use lars2aws_core::storage::{
    ListPage, ListRequest, ObjectHead, ObjectStore, ObjectSummary, PutRequest, SseSettings,
};

pub const BASE_URL: &str = "http://lars.test/get";

pub fn catalog_config() -> CatalogConfig {
    CatalogConfig {
        base_url: BASE_URL.to_string(),
        backoff_ms: 1,
        ..CatalogConfig::default()
    }
}

pub fn inject_config() -> InjectConfig {
    InjectConfig {
        run_as_user: None,
        ..InjectConfig::default()
    }
}

// =============================================================================
// HTTP
// =============================================================================

#[derive(Debug, Clone)]
pub enum Reply {
    Body(String),
    Status(u16),
    Transport,
    /// Body stream that fails after the given bytes.
    BrokenBody(String),
}

/// Scripted HTTP source. Each URL has a queue of replies; the last reply
/// repeats once the queue is down to one.
#[derive(Default)]
pub struct FakeHttp {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, replies: Vec<Reply>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into());
        self
    }

    pub fn body(self, url: &str, body: &str) -> Self {
        self.route(url, vec![Reply::Body(body.to_string())])
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    fn next_reply(&self, url: &str) -> Reply {
        self.calls.lock().unwrap().push(url.to_string());
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Status(404)),
            None => Reply::Status(404),
        }
    }
}

fn reply_error(url: &str, reply: &Reply) -> Option<FetchError> {
    match reply {
        Reply::Status(status) => Some(FetchError::Status {
            url: url.to_string(),
            status: *status,
        }),
        Reply::Transport => Some(FetchError::Transport {
            url: url.to_string(),
            message: "connection reset".to_string(),
        }),
        _ => None,
    }
}

#[async_trait]
impl HttpSource for FakeHttp {
    async fn get_text(&self, url: &str, _timeout: Duration) -> Result<String, FetchError> {
        let reply = self.next_reply(url);
        if let Some(err) = reply_error(url, &reply) {
            return Err(err);
        }
        match reply {
            Reply::Body(body) | Reply::BrokenBody(body) => Ok(body),
            _ => unreachable!(),
        }
    }

    async fn get_stream(&self, url: &str) -> Result<ByteStream, FetchError> {
        let reply = self.next_reply(url);
        if let Some(err) = reply_error(url, &reply) {
            return Err(err);
        }
        let owned = url.to_string();
        match reply {
            Reply::Body(body) => {
                // Split into small pieces so consumers see a real stream.
                let pieces: Vec<Result<Bytes, FetchError>> = body
                    .into_bytes()
                    .chunks(3)
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                Ok(futures::stream::iter(pieces).boxed())
            }
            Reply::BrokenBody(body) => Ok(futures::stream::iter(vec![
                Ok(Bytes::from(body)),
                Err(FetchError::Transport {
                    url: owned,
                    message: "body truncated".to_string(),
                }),
            ])
            .boxed()),
            _ => unreachable!(),
        }
    }
}

// =============================================================================
// Object store
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub sse: Option<SseSettings>,
}

/// Object store over a sorted map, with S3-like delimiter and paging rules.
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    fail_keys: Mutex<HashSet<String>>,
    page_size: usize,
    list_calls: Mutex<Vec<(String, Option<String>)>>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::with_page_size(1000)
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            fail_keys: Mutex::new(HashSet::new()),
            page_size,
            list_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, bucket: &str, key: &str, data: &str) {
        self.insert_with_metadata(bucket, key, data, BTreeMap::new());
    }

    pub fn insert_with_metadata(
        &self,
        bucket: &str,
        key: &str,
        data: &str,
        metadata: BTreeMap<String, String>,
    ) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.as_bytes().to_vec(),
                content_type: None,
                metadata,
                sse: None,
            },
        );
    }

    pub fn fail_on(&self, key: &str) {
        self.fail_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn list_calls(&self) -> Vec<(String, Option<String>)> {
        self.list_calls.lock().unwrap().clone()
    }
}

enum Entry {
    Object(ObjectSummary),
    Prefix(String),
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_stream(&self, request: PutRequest, mut body: ByteStream) -> Result<(), StoreError> {
        if self.fail_keys.lock().unwrap().contains(&request.key) {
            return Err(StoreError::Request {
                operation: "PutObject",
                bucket: request.bucket,
                key: request.key,
                message: "access denied".to_string(),
            });
        }

        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => data.extend_from_slice(&bytes),
                Err(source) => {
                    return Err(StoreError::Body {
                        bucket: request.bucket,
                        key: request.key,
                        source,
                    });
                }
            }
        }

        self.objects.lock().unwrap().insert(
            (request.bucket, request.key),
            StoredObject {
                data,
                content_type: request.content_type.map(str::to_string),
                metadata: request.metadata.unwrap_or_default(),
                sse: request.sse,
            },
        );
        Ok(())
    }

    async fn list_page(&self, request: &ListRequest) -> Result<ListPage, StoreError> {
        self.list_calls
            .lock()
            .unwrap()
            .push((request.prefix.clone(), request.delimiter.clone()));

        let objects = self.objects.lock().unwrap();
        let mut entries = Vec::new();
        let mut prefixes = BTreeSet::new();
        for ((bucket, key), object) in objects.iter() {
            if *bucket != request.bucket || !key.starts_with(&request.prefix) {
                continue;
            }
            let rest = &key[request.prefix.len()..];
            if let Some(delimiter) = request.delimiter.as_deref() {
                if let Some(idx) = rest.find(delimiter) {
                    let prefix = format!("{}{}", request.prefix, &rest[..idx + delimiter.len()]);
                    if prefixes.insert(prefix.clone()) {
                        entries.push(Entry::Prefix(prefix));
                    }
                    continue;
                }
            }
            entries.push(Entry::Object(ObjectSummary {
                key: key.clone(),
                size: Some(object.data.len() as i64),
            }));
        }

        let total = entries.len();
        let start: usize = request
            .continuation_token
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0)
            .min(total);
        let end = (start + self.page_size).min(total);

        let mut page = ListPage::default();
        for entry in entries.drain(start..end) {
            match entry {
                Entry::Object(summary) => page.objects.push(summary),
                Entry::Prefix(prefix) => page.common_prefixes.push(prefix),
            }
        }
        page.next_continuation_token = (end < total).then(|| end.to_string());
        Ok(page)
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, StoreError> {
        match self.get(bucket, key) {
            Some(object) => Ok(ObjectHead {
                content_length: Some(object.data.len() as i64),
                content_type: object.content_type,
                last_modified: None,
                metadata: object.metadata,
            }),
            None => Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
        }
    }
}

// =============================================================================
// Remote execution
// =============================================================================

#[derive(Debug, Clone)]
pub enum Invocation {
    Missing,
    Status(&'static str),
    Error,
}

/// Records sent commands and replays scripted invocation states; the last
/// state repeats.
#[derive(Default)]
pub struct FakeRemote {
    sent: Mutex<Vec<SendCommand>>,
    invocations: Mutex<VecDeque<Invocation>>,
    polls: Mutex<usize>,
}

impl FakeRemote {
    pub fn new(invocations: Vec<Invocation>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            invocations: Mutex::new(invocations.into()),
            polls: Mutex::new(0),
        }
    }

    pub fn sent(&self) -> Vec<SendCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub fn polls(&self) -> usize {
        *self.polls.lock().unwrap()
    }
}

#[async_trait]
impl RemoteExec for FakeRemote {
    async fn send_command(&self, command: SendCommand) -> Result<String, RemoteError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(command);
        Ok(format!("cmd-{}", sent.len()))
    }

    async fn get_invocation(
        &self,
        command_id: &str,
        instance: &str,
    ) -> Result<RemoteCommand, RemoteError> {
        *self.polls.lock().unwrap() += 1;
        let next = {
            let mut queue = self.invocations.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap_or(Invocation::Missing)
            }
        };

        match next {
            Invocation::Missing => Err(RemoteError::InvocationNotFound {
                command_id: command_id.to_string(),
                instance: instance.to_string(),
            }),
            Invocation::Error => Err(RemoteError::Poll {
                command_id: command_id.to_string(),
                instance: instance.to_string(),
                message: "throttled".to_string(),
            }),
            Invocation::Status(status) => {
                let status = CommandStatus::from_service(status);
                let terminal = status.is_terminal();
                Ok(RemoteCommand {
                    command_id: command_id.to_string(),
                    target_instance: instance.to_string(),
                    status,
                    status_details: None,
                    stdout: if terminal { "copied".to_string() } else { String::new() },
                    stderr: String::new(),
                    stdout_url: None,
                    stderr_url: None,
                })
            }
        }
    }
}
