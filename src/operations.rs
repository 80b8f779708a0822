//! Gateway operations
//!
//! Each operation takes the caller's arguments, builds a request holding only
//! the optional fields the caller actually supplied, makes one backend call
//! through the [`ConnectionManager`] and returns a typed result.

use bytes::Bytes;
use serde::Deserialize;
use std::path::PathBuf;

use crate::connection::ConnectionManager;
use crate::error::{GatewayError, Result};
use crate::normalize;
use crate::s3::types::{
    CopyObjectOutput, CopyObjectRequest, CopySource, DeleteObjectOutput, DeleteObjectRequest,
    DeleteObjectsOutput, DeleteObjectsRequest, DeleteSpec, DownloadFileRequest, GetObjectRequest,
    GetObjectResult, HeadObjectOutput, HeadObjectRequest, ListBucketsOutput, ListObjectsV2Output,
    ListObjectsV2Request, PutObjectOutput, PutObjectRequest, TransferAck, UploadFileRequest,
};

/// How the `body` argument of put-object is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodySource {
    /// `body` is the object content
    #[default]
    Text,
    /// `body` is a local path whose bytes become the object content
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PutObjectArgs {
    pub bucket: String,
    pub key: String,
    pub body: String,
    #[serde(default)]
    pub body_source: BodySource,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectArgs {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListObjectsArgs {
    pub bucket: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub max_keys: Option<i32>,
    #[serde(default)]
    pub continuation_token: Option<String>,
    #[serde(default)]
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeadObjectArgs {
    pub bucket: String,
    pub key: String,
    #[serde(default)]
    pub if_match: Option<String>,
    #[serde(default)]
    pub if_none_match: Option<String>,
    #[serde(default)]
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadFileArgs {
    pub filename: PathBuf,
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadFileArgs {
    pub bucket: String,
    pub key: String,
    pub filename: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyObjectArgs {
    pub source_bucket: String,
    pub source_key: String,
    pub destination_bucket: String,
    pub destination_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteObjectsArgs {
    pub bucket: String,
    pub keys: Vec<String>,
    #[serde(default)]
    pub quiet: bool,
}

/// An optional text argument counts as supplied only when non-empty
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// A page size of zero counts as not supplied
fn present_count(value: Option<i32>) -> Option<i32> {
    value.filter(|v| *v != 0)
}

impl ListObjectsArgs {
    pub fn into_request(self) -> ListObjectsV2Request {
        ListObjectsV2Request {
            bucket: self.bucket,
            prefix: present(self.prefix),
            max_keys: present_count(self.max_keys),
            continuation_token: present(self.continuation_token),
            delimiter: present(self.delimiter),
        }
    }
}

impl HeadObjectArgs {
    pub fn into_request(self) -> HeadObjectRequest {
        HeadObjectRequest {
            bucket: self.bucket,
            key: self.key,
            if_match: present(self.if_match),
            if_none_match: present(self.if_none_match),
            version_id: present(self.version_id),
        }
    }
}

impl CopyObjectArgs {
    pub fn into_request(self) -> CopyObjectRequest {
        CopyObjectRequest {
            copy_source: CopySource {
                bucket: self.source_bucket,
                key: self.source_key,
            },
            bucket: self.destination_bucket,
            key: self.destination_key,
        }
    }
}

impl DeleteObjectsArgs {
    pub fn into_request(self) -> Result<DeleteObjectsRequest> {
        if self.keys.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "delete_objects requires at least one key".to_string(),
            ));
        }

        Ok(DeleteObjectsRequest {
            bucket: self.bucket,
            delete: DeleteSpec::new(self.keys, self.quiet),
        })
    }
}

/// The operation set, sharing one lazily validated backend connection
pub struct Gateway {
    connection: ConnectionManager,
}

impl Gateway {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// List all buckets in the account
    pub async fn list_buckets(&self) -> Result<ListBucketsOutput> {
        tracing::debug!("list_buckets");
        let backend = self.connection.acquire().await?;
        backend.list_buckets().await
    }

    /// Store an object from literal text or from a local file
    pub async fn put_object(&self, args: PutObjectArgs) -> Result<PutObjectOutput> {
        tracing::info!("put_object: {}/{} ({:?})", args.bucket, args.key, args.body_source);

        let body = match args.body_source {
            BodySource::Text => Bytes::from(args.body),
            BodySource::File => {
                let data = tokio::fs::read(&args.body)
                    .await
                    .map_err(|e| GatewayError::local_io(&args.body, e))?;
                Bytes::from(data)
            }
        };

        let request = PutObjectRequest {
            bucket: args.bucket,
            key: args.key,
            body,
            content_type: present(args.content_type),
        };

        let backend = self.connection.acquire().await?;
        backend.put_object(request).await
    }

    /// Fetch an object and return it with its body decoded as text
    pub async fn get_object(&self, args: ObjectArgs) -> Result<GetObjectResult> {
        tracing::info!("get_object: {}/{}", args.bucket, args.key);

        let backend = self.connection.acquire().await?;
        let raw = backend
            .get_object(GetObjectRequest {
                bucket: args.bucket,
                key: args.key,
            })
            .await?;

        normalize::materialize(raw).await
    }

    pub async fn delete_object(&self, args: ObjectArgs) -> Result<DeleteObjectOutput> {
        tracing::info!("delete_object: {}/{}", args.bucket, args.key);

        let backend = self.connection.acquire().await?;
        backend
            .delete_object(DeleteObjectRequest {
                bucket: args.bucket,
                key: args.key,
            })
            .await
    }

    /// List one page of objects
    pub async fn list_objects_v2(&self, args: ListObjectsArgs) -> Result<ListObjectsV2Output> {
        let request = args.into_request();
        tracing::debug!(
            "list_objects_v2: bucket={}, prefix={:?}, continuation={}",
            request.bucket,
            request.prefix,
            request.continuation_token.is_some()
        );

        let backend = self.connection.acquire().await?;
        backend.list_objects_v2(request).await
    }

    /// Object metadata, honoring the caller's conditional headers
    pub async fn head_object(&self, args: HeadObjectArgs) -> Result<HeadObjectOutput> {
        let request = args.into_request();
        tracing::debug!("head_object: {}/{}", request.bucket, request.key);

        let backend = self.connection.acquire().await?;
        backend.head_object(request).await
    }

    /// Server-side copy
    pub async fn copy_object(&self, args: CopyObjectArgs) -> Result<CopyObjectOutput> {
        let request = args.into_request();
        tracing::info!(
            "copy_object: {} -> {}/{}",
            request.copy_source.to_header(),
            request.bucket,
            request.key
        );

        let backend = self.connection.acquire().await?;
        backend.copy_object(request).await
    }

    /// Delete several keys in one request. In quiet mode the backend reports
    /// only the failures.
    pub async fn delete_objects(&self, args: DeleteObjectsArgs) -> Result<DeleteObjectsOutput> {
        let request = args.into_request()?;
        tracing::info!(
            "delete_objects: {} keys from {} (quiet={})",
            request.delete.objects.len(),
            request.bucket,
            request.delete.quiet
        );

        let backend = self.connection.acquire().await?;
        let output = backend.delete_objects(request).await?;

        if !output.errors.is_empty() {
            tracing::warn!("delete_objects: {} keys failed", output.errors.len());
        }
        Ok(output)
    }

    pub async fn upload_file(&self, args: UploadFileArgs) -> Result<TransferAck> {
        let request = UploadFileRequest {
            filename: args.filename,
            bucket: args.bucket,
            key: args.key,
        };
        tracing::info!(
            "upload_file: {} -> {}/{}",
            request.filename.display(),
            request.bucket,
            request.key
        );

        let backend = self.connection.acquire().await?;
        let ack = TransferAck::uploaded(&request);
        backend.upload_file(request).await?;
        Ok(ack)
    }

    pub async fn download_file(&self, args: DownloadFileArgs) -> Result<TransferAck> {
        let request = DownloadFileRequest {
            bucket: args.bucket,
            key: args.key,
            filename: args.filename,
        };
        tracing::info!(
            "download_file: {}/{} -> {}",
            request.bucket,
            request.key,
            request.filename.display()
        );

        let backend = self.connection.acquire().await?;
        let ack = TransferAck::downloaded(&request);
        backend.download_file(request).await?;
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::mock::{MockBackend, MockConnector};
    use serde_json::json;

    fn gateway(backend: &MockBackend) -> Gateway {
        Gateway::new(ConnectionManager::new(MockConnector::new(backend.clone())))
    }

    #[test]
    fn test_list_objects_args_sparse_request() {
        let request = ListObjectsArgs {
            bucket: "b".to_string(),
            prefix: Some(String::new()),
            max_keys: Some(0),
            continuation_token: None,
            delimiter: Some("/".to_string()),
        }
        .into_request();

        assert_eq!(request.prefix, None);
        assert_eq!(request.max_keys, None);
        assert_eq!(request.continuation_token, None);
        assert_eq!(request.delimiter.as_deref(), Some("/"));
    }

    #[test]
    fn test_delete_objects_args_require_keys() {
        let args = DeleteObjectsArgs {
            bucket: "b".to_string(),
            keys: Vec::new(),
            quiet: false,
        };
        let err = args.into_request().unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn test_args_reject_unknown_fields() {
        let parsed: std::result::Result<ObjectArgs, _> =
            serde_json::from_value(json!({"bucket": "b", "key": "k", "extra": 1}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_put_object_args_default_to_text() {
        let args: PutObjectArgs =
            serde_json::from_value(json!({"bucket": "b", "key": "k", "body": "hi"})).unwrap();
        assert_eq!(args.body_source, BodySource::Text);
        assert!(args.content_type.is_none());
    }

    #[tokio::test]
    async fn test_put_object_text_is_literal_even_if_path_exists() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"file contents").unwrap();
        let path = file.path().display().to_string();

        let backend = MockBackend::new().with_bucket("b");
        let gateway = gateway(&backend);

        gateway
            .put_object(PutObjectArgs {
                bucket: "b".to_string(),
                key: "k".to_string(),
                body: path.clone(),
                body_source: BodySource::Text,
                content_type: None,
            })
            .await
            .unwrap();

        assert_eq!(backend.object("b", "k").unwrap(), Bytes::from(path));
    }

    #[tokio::test]
    async fn test_put_object_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"file contents").unwrap();

        let backend = MockBackend::new().with_bucket("b");
        let gateway = gateway(&backend);

        gateway
            .put_object(PutObjectArgs {
                bucket: "b".to_string(),
                key: "k".to_string(),
                body: file.path().display().to_string(),
                body_source: BodySource::File,
                content_type: Some("text/plain".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(
            backend.object("b", "k").unwrap(),
            Bytes::from_static(b"file contents")
        );
        assert_eq!(
            backend.last_request("put_object").unwrap(),
            json!({"Bucket": "b", "Key": "k", "ContentType": "text/plain"})
        );
    }

    #[tokio::test]
    async fn test_put_object_missing_file_is_local_error() {
        let backend = MockBackend::new().with_bucket("b");
        let gateway = gateway(&backend);

        let err = gateway
            .put_object(PutObjectArgs {
                bucket: "b".to_string(),
                key: "k".to_string(),
                body: "/nonexistent/dir/input.txt".to_string(),
                body_source: BodySource::File,
                content_type: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "local_io_error");
        assert!(backend.calls_to("put_object").is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_passes_through() {
        let backend = MockBackend::new().with_bucket("b");
        let gateway = gateway(&backend);

        let err = gateway
            .get_object(ObjectArgs {
                bucket: "b".to_string(),
                key: "missing".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.backend_code(), Some("NoSuchKey"));
        assert_eq!(backend.calls_to("get_object").len(), 1);
    }

    #[tokio::test]
    async fn test_operations_fail_until_connected() {
        let backend = MockBackend::new().with_bucket("b");
        let connector = std::sync::Arc::new(MockConnector::new(backend.clone()));
        connector.fail_next_constructions(1);
        let gateway = Gateway::new(ConnectionManager::new(connector.clone()));

        let err = gateway.list_buckets().await.unwrap_err();
        assert_eq!(err.kind(), "credentials_unavailable");
        assert!(backend.calls().is_empty());

        let buckets = gateway.list_buckets().await.unwrap();
        assert_eq!(buckets.buckets.len(), 1);
        // One validation listing plus the listing itself
        assert_eq!(backend.calls_to("list_buckets").len(), 2);
    }
}
