//! Storage backend interface
//!
//! [`StorageBackend`] is the stable client interface every operation goes
//! through. [`BackendConnector`] builds one; the connection manager owns the
//! result.

use async_trait::async_trait;

use crate::error::Result;
use crate::s3::types::{
    CopyObjectOutput, CopyObjectRequest, DeleteObjectOutput, DeleteObjectRequest,
    DeleteObjectsOutput, DeleteObjectsRequest, DownloadFileRequest, GetObjectOutput,
    GetObjectRequest, HeadObjectOutput, HeadObjectRequest, ListBucketsOutput,
    ListObjectsV2Output, ListObjectsV2Request, PutObjectOutput, PutObjectRequest,
    UploadFileRequest,
};

/// One backend round trip per method
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn list_buckets(&self) -> Result<ListBucketsOutput>;

    async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectOutput>;

    /// The returned body is unread
    async fn get_object(&self, request: GetObjectRequest) -> Result<GetObjectOutput>;

    async fn delete_object(&self, request: DeleteObjectRequest) -> Result<DeleteObjectOutput>;

    async fn list_objects_v2(&self, request: ListObjectsV2Request) -> Result<ListObjectsV2Output>;

    async fn head_object(&self, request: HeadObjectRequest) -> Result<HeadObjectOutput>;

    async fn copy_object(&self, request: CopyObjectRequest) -> Result<CopyObjectOutput>;

    async fn delete_objects(&self, request: DeleteObjectsRequest) -> Result<DeleteObjectsOutput>;

    /// Stream a local file to an object
    async fn upload_file(&self, request: UploadFileRequest) -> Result<()>;

    /// Stream an object to a local file
    async fn download_file(&self, request: DownloadFileRequest) -> Result<()>;
}

/// Constructs a backend client. Called again after every failed attempt.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StorageBackend>>;
}

#[async_trait]
impl<T: BackendConnector + ?Sized> BackendConnector for std::sync::Arc<T> {
    async fn connect(&self) -> Result<Box<dyn StorageBackend>> {
        (**self).connect().await
    }
}
