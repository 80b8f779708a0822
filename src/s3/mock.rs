//! In-memory backend that records every request it receives

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{GatewayError, Result};
use crate::s3::backend::{BackendConnector, StorageBackend};
use crate::s3::transfer;
use crate::s3::types::{
    BucketSummary, CommonPrefix, CopyObjectOutput, CopyObjectRequest, CopyObjectResult,
    DeleteFailure, DeleteObjectOutput, DeleteObjectRequest, DeleteObjectsOutput,
    DeleteObjectsRequest, DeletedObject, DownloadFileRequest, GetObjectOutput, GetObjectRequest,
    HeadObjectOutput, HeadObjectRequest, ListBucketsOutput, ListObjectsV2Output,
    ListObjectsV2Request, ObjectMetadata, ObjectSummary, PutObjectOutput, PutObjectRequest,
    UploadFileRequest,
};

/// A request as the backend saw it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: &'static str,
    pub request: serde_json::Value,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn e_tag(&self) -> String {
        format!("\"{:016x}\"", fnv1a(&self.data))
    }
}

fn fnv1a(data: &[u8]) -> u64 {
    data.iter().fold(0xcbf29ce484222325u64, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x100000001b3)
    })
}

#[derive(Default)]
struct MockState {
    buckets: BTreeSet<String>,
    objects: BTreeMap<(String, String), StoredObject>,
    calls: Vec<RecordedCall>,
    failing_delete_keys: BTreeSet<String>,
    failing_listings: usize,
}

/// Clones share state, so a test can keep one handle and give another to the gateway
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        self.state().buckets.insert(bucket.to_string());
        self
    }

    pub fn with_object(self, bucket: &str, key: &str, data: impl Into<Bytes>) -> Self {
        {
            let mut state = self.state();
            state.buckets.insert(bucket.to_string());
            state.objects.insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    data: data.into(),
                    content_type: None,
                    last_modified: Utc::now(),
                },
            );
        }
        self
    }

    /// Make batch deletes report `key` as a per-key failure
    pub fn fail_delete_of(&self, key: &str) {
        self.state().failing_delete_keys.insert(key.to_string());
    }

    /// Reject the next `count` bucket listings with an invalid-key error
    pub fn fail_next_listings(&self, count: usize) {
        self.state().failing_listings = count;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    /// The most recent request sent for `operation`
    pub fn last_request(&self, operation: &str) -> Option<serde_json::Value> {
        self.state()
            .calls
            .iter()
            .rev()
            .find(|c| c.operation == operation)
            .map(|c| c.request.clone())
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.state()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record<T: serde::Serialize>(&self, operation: &'static str, request: &T) {
        let request = serde_json::to_value(request).unwrap_or(serde_json::Value::Null);
        self.state().calls.push(RecordedCall { operation, request });
    }

    fn require_bucket(&self, operation: &'static str, bucket: &str) -> Result<()> {
        if self.state().buckets.contains(bucket) {
            Ok(())
        } else {
            Err(GatewayError::BackendRequest {
                operation,
                code: "NoSuchBucket".to_string(),
                message: "The specified bucket does not exist".to_string(),
            })
        }
    }

    fn find(&self, operation: &'static str, bucket: &str, key: &str) -> Result<StoredObject> {
        self.require_bucket(operation, bucket)?;
        self.state()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| GatewayError::BackendRequest {
                operation,
                code: "NoSuchKey".to_string(),
                message: "The specified key does not exist.".to_string(),
            })
    }

    fn store(&self, bucket: &str, key: &str, data: Bytes, content_type: Option<String>) -> String {
        let object = StoredObject {
            data,
            content_type,
            last_modified: Utc::now(),
        };
        let e_tag = object.e_tag();
        self.state()
            .objects
            .insert((bucket.to_string(), key.to_string()), object);
        e_tag
    }

    fn metadata(object: &StoredObject) -> ObjectMetadata {
        ObjectMetadata {
            accept_ranges: Some("bytes".to_string()),
            last_modified: Some(object.last_modified),
            content_length: Some(object.data.len() as i64),
            e_tag: Some(object.e_tag()),
            content_type: object.content_type.clone(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    async fn list_buckets(&self) -> Result<ListBucketsOutput> {
        self.record("list_buckets", &serde_json::json!({}));

        let mut state = self.state();
        if state.failing_listings > 0 {
            state.failing_listings -= 1;
            return Err(GatewayError::BackendRequest {
                operation: "list_buckets",
                code: "InvalidAccessKeyId".to_string(),
                message: "The AWS Access Key Id you provided does not exist in our records."
                    .to_string(),
            });
        }

        Ok(ListBucketsOutput {
            buckets: state
                .buckets
                .iter()
                .map(|name| BucketSummary {
                    name: name.clone(),
                    creation_date: None,
                })
                .collect(),
            owner: None,
        })
    }

    async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectOutput> {
        self.record("put_object", &request);
        self.require_bucket("put_object", &request.bucket)?;

        let e_tag = self.store(&request.bucket, &request.key, request.body, request.content_type);
        Ok(PutObjectOutput {
            e_tag: Some(e_tag),
            ..Default::default()
        })
    }

    async fn get_object(&self, request: GetObjectRequest) -> Result<GetObjectOutput> {
        self.record("get_object", &request);
        let object = self.find("get_object", &request.bucket, &request.key)?;

        Ok(GetObjectOutput {
            metadata: Self::metadata(&object),
            body: ByteStream::from(object.data),
        })
    }

    async fn delete_object(&self, request: DeleteObjectRequest) -> Result<DeleteObjectOutput> {
        self.record("delete_object", &request);
        self.require_bucket("delete_object", &request.bucket)?;

        // Deleting a missing key succeeds, as on S3
        self.state()
            .objects
            .remove(&(request.bucket.clone(), request.key.clone()));
        Ok(DeleteObjectOutput::default())
    }

    async fn list_objects_v2(&self, request: ListObjectsV2Request) -> Result<ListObjectsV2Output> {
        self.record("list_objects_v2", &request);
        self.require_bucket("list_objects_v2", &request.bucket)?;

        let prefix = request.prefix.clone().unwrap_or_default();
        let max_keys = request.max_keys.unwrap_or(1000).max(0) as usize;
        let start_after = request.continuation_token.clone().unwrap_or_default();

        let state = self.state();
        let mut contents = Vec::new();
        let mut common_prefixes: Vec<CommonPrefix> = Vec::new();
        let mut last_key: Option<String> = None;
        let mut next_continuation_token = None;

        let keys = state.objects.iter().filter(|((bucket, key), _)| {
            bucket == &request.bucket
                && key.starts_with(&prefix)
                && key.as_str() > start_after.as_str()
        });

        for ((_, key), object) in keys {
            let rest = &key[prefix.len()..];
            let folder = request
                .delimiter
                .as_deref()
                .and_then(|d| rest.find(d).map(|pos| format!("{}{}", prefix, &rest[..pos + d.len()])));

            // Keys rolled into the previous common prefix do not count against max_keys
            if let Some(folder) = &folder {
                if common_prefixes.last().map(|p| &p.prefix) == Some(folder) {
                    last_key = Some(key.clone());
                    continue;
                }
            }

            if contents.len() + common_prefixes.len() >= max_keys {
                next_continuation_token = last_key.clone();
                break;
            }

            match folder {
                Some(folder) => common_prefixes.push(CommonPrefix { prefix: folder }),
                None => contents.push(ObjectSummary {
                    key: key.clone(),
                    last_modified: Some(object.last_modified),
                    e_tag: Some(object.e_tag()),
                    size: object.data.len() as i64,
                    storage_class: Some("STANDARD".to_string()),
                }),
            }
            last_key = Some(key.clone());
        }

        Ok(ListObjectsV2Output {
            name: Some(request.bucket.clone()),
            prefix: request.prefix.clone(),
            delimiter: request.delimiter.clone(),
            max_keys: Some(max_keys as i32),
            key_count: Some((contents.len() + common_prefixes.len()) as i32),
            is_truncated: next_continuation_token.is_some(),
            contents,
            common_prefixes,
            continuation_token: request.continuation_token,
            next_continuation_token,
        })
    }

    async fn head_object(&self, request: HeadObjectRequest) -> Result<HeadObjectOutput> {
        self.record("head_object", &request);
        let object = self.find("head_object", &request.bucket, &request.key)?;
        let e_tag = object.e_tag();

        if let Some(expected) = &request.if_match {
            if expected != &e_tag {
                return Err(GatewayError::BackendRequest {
                    operation: "head_object",
                    code: "PreconditionFailed".to_string(),
                    message: "At least one of the pre-conditions you specified did not hold"
                        .to_string(),
                });
            }
        }
        if let Some(unexpected) = &request.if_none_match {
            if unexpected == &e_tag {
                return Err(GatewayError::BackendRequest {
                    operation: "head_object",
                    code: "NotModified".to_string(),
                    message: "Not Modified".to_string(),
                });
            }
        }

        Ok(Self::metadata(&object))
    }

    async fn copy_object(&self, request: CopyObjectRequest) -> Result<CopyObjectOutput> {
        self.record("copy_object", &request);
        let source = self.find(
            "copy_object",
            &request.copy_source.bucket,
            &request.copy_source.key,
        )?;
        self.require_bucket("copy_object", &request.bucket)?;

        let e_tag = self.store(&request.bucket, &request.key, source.data, source.content_type);
        Ok(CopyObjectOutput {
            copy_object_result: Some(CopyObjectResult {
                e_tag: Some(e_tag),
                last_modified: Some(Utc::now()),
            }),
            ..Default::default()
        })
    }

    async fn delete_objects(&self, request: DeleteObjectsRequest) -> Result<DeleteObjectsOutput> {
        self.record("delete_objects", &request);
        self.require_bucket("delete_objects", &request.bucket)?;

        let mut state = self.state();
        let mut output = DeleteObjectsOutput::default();

        for object in &request.delete.objects {
            if state.failing_delete_keys.contains(&object.key) {
                output.errors.push(DeleteFailure {
                    key: object.key.clone(),
                    version_id: None,
                    code: "AccessDenied".to_string(),
                    message: "Access Denied".to_string(),
                });
                continue;
            }

            state
                .objects
                .remove(&(request.bucket.clone(), object.key.clone()));
            if !request.delete.quiet {
                output.deleted.push(DeletedObject {
                    key: object.key.clone(),
                    version_id: None,
                    delete_marker: None,
                });
            }
        }

        Ok(output)
    }

    async fn upload_file(&self, request: UploadFileRequest) -> Result<()> {
        self.record("upload_file", &request);
        let data = tokio::fs::read(&request.filename)
            .await
            .map_err(|e| GatewayError::local_io(&request.filename, e))?;
        self.require_bucket("upload_file", &request.bucket)?;

        self.store(&request.bucket, &request.key, Bytes::from(data), None);
        Ok(())
    }

    async fn download_file(&self, request: DownloadFileRequest) -> Result<()> {
        self.record("download_file", &request);
        let object = self.find("download_file", &request.bucket, &request.key)?;

        let chunks = futures::stream::iter([Ok::<_, std::convert::Infallible>(object.data)]);
        transfer::save_atomically("download_file", chunks, &request.filename).await?;
        Ok(())
    }
}

/// Hands out clones of one [`MockBackend`] and counts construction attempts
#[derive(Default)]
pub struct MockConnector {
    backend: MockBackend,
    constructions: AtomicUsize,
    failing_constructions: AtomicUsize,
}

impl MockConnector {
    pub fn new(backend: MockBackend) -> Self {
        Self {
            backend,
            constructions: AtomicUsize::new(0),
            failing_constructions: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` constructions with missing credentials
    pub fn fail_next_constructions(&self, count: usize) {
        self.failing_constructions.store(count, Ordering::SeqCst);
    }

    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendConnector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn StorageBackend>> {
        let attempt = self.constructions.fetch_add(1, Ordering::SeqCst) + 1;

        // Let concurrent callers pile up behind the initialization guard
        tokio::task::yield_now().await;

        let failing = self.failing_constructions.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_constructions.store(failing - 1, Ordering::SeqCst);
            return Err(GatewayError::CredentialsUnavailable(format!(
                "no credentials provider configured (attempt {})",
                attempt
            )));
        }

        Ok(Box::new(self.backend.clone()))
    }
}
