//! AWS S3 client backend

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, ProvideCredentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use std::collections::BTreeMap;

use crate::error::{GatewayError, Result};
use crate::normalize::to_utc;
use crate::s3::backend::{BackendConnector, StorageBackend};
use crate::s3::transfer;
use crate::s3::types::{
    BucketSummary, CommonPrefix, CopyObjectOutput, CopyObjectRequest, CopyObjectResult,
    DeleteFailure, DeleteObjectOutput, DeleteObjectRequest, DeleteObjectsOutput,
    DeleteObjectsRequest, DeletedObject, DownloadFileRequest, GetObjectOutput, GetObjectRequest,
    HeadObjectOutput, HeadObjectRequest, ListBucketsOutput, ListObjectsV2Output,
    ListObjectsV2Request, ObjectMetadata, ObjectSummary, Owner, PutObjectOutput,
    PutObjectRequest, UploadFileRequest,
};

const CREDENTIALS_PROVIDER_NAME: &str = "s3-gateway";
const DEFAULT_REGION: &str = "us-east-1";

/// Settings used to construct the AWS client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3ClientConfig {
    /// Custom endpoint for S3-compatible services such as MinIO
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Builds an [`aws_sdk_s3::Client`] from [`S3ClientConfig`]
pub struct S3Connector {
    config: S3ClientConfig,
}

impl S3Connector {
    pub fn new(config: S3ClientConfig) -> Self {
        Self { config }
    }

    /// Build the SDK client and confirm a credential can be resolved
    pub async fn build_client(&self) -> Result<Client> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &self.config.region {
            loader = loader.region(Region::new(region.clone()));
        }

        // Explicit keys win over the default credential chain
        if let (Some(access_key_id), Some(secret_access_key)) =
            (&self.config.access_key_id, &self.config.secret_access_key)
        {
            let credentials = Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                CREDENTIALS_PROVIDER_NAME,
            );
            loader = loader.credentials_provider(credentials);
        }

        if let Some(endpoint) = &self.config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;

        let provider = sdk_config.credentials_provider().ok_or_else(|| {
            GatewayError::CredentialsUnavailable("no credentials provider configured".to_string())
        })?;
        provider.provide_credentials().await.map_err(|e| {
            GatewayError::CredentialsUnavailable(DisplayErrorContext(&e).to_string())
        })?;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        tracing::debug!(
            "Building S3 client: region={}, endpoint={:?}, path_style={}",
            region,
            self.config.endpoint_url,
            self.config.force_path_style
        );

        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(self.config.force_path_style);
        if sdk_config.region().is_none() {
            s3_config = s3_config.region(Region::new(DEFAULT_REGION));
        }

        Ok(Client::from_conf(s3_config.build()))
    }
}

#[async_trait]
impl BackendConnector for S3Connector {
    async fn connect(&self) -> Result<Box<dyn StorageBackend>> {
        let client = self.build_client().await?;
        Ok(Box::new(client))
    }
}

/// Map an SDK error to a backend failure, keeping the service code and message.
/// Transport-level failures carry `N/A` and the full error chain.
fn sdk_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> GatewayError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let (code, message) = match err.as_service_error() {
        Some(service_err) => (
            service_err.code().unwrap_or("unknown").to_string(),
            service_err.message().unwrap_or("no message").to_string(),
        ),
        None => ("N/A".to_string(), DisplayErrorContext(&err).to_string()),
    };

    tracing::debug!("S3 {} failed: {} ({})", operation, code, message);

    GatewayError::BackendRequest {
        operation,
        code,
        message,
    }
}

fn user_metadata(
    metadata: Option<&std::collections::HashMap<String, String>>,
) -> BTreeMap<String, String> {
    metadata
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

#[async_trait]
impl StorageBackend for Client {
    async fn list_buckets(&self) -> Result<ListBucketsOutput> {
        let response = self
            .list_buckets()
            .send()
            .await
            .map_err(|e| sdk_error("list_buckets", e))?;

        let buckets = response
            .buckets()
            .iter()
            .map(|b| BucketSummary {
                name: b.name().unwrap_or_default().to_string(),
                creation_date: b.creation_date().and_then(to_utc),
            })
            .collect();

        let owner = response.owner().map(|o| Owner {
            display_name: o.display_name().map(|s| s.to_string()),
            id: o.id().map(|s| s.to_string()),
        });

        Ok(ListBucketsOutput { buckets, owner })
    }

    async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectOutput> {
        let response = self
            .put_object()
            .bucket(request.bucket)
            .key(request.key)
            .set_content_type(request.content_type)
            .body(ByteStream::from(request.body))
            .send()
            .await
            .map_err(|e| sdk_error("put_object", e))?;

        Ok(PutObjectOutput {
            e_tag: response.e_tag().map(|s| s.to_string()),
            version_id: response.version_id().map(|s| s.to_string()),
            server_side_encryption: response
                .server_side_encryption()
                .map(|s| s.as_str().to_string()),
        })
    }

    async fn get_object(&self, request: GetObjectRequest) -> Result<GetObjectOutput> {
        let response = self
            .get_object()
            .bucket(request.bucket)
            .key(request.key)
            .send()
            .await
            .map_err(|e| sdk_error("get_object", e))?;

        let metadata = ObjectMetadata {
            accept_ranges: response.accept_ranges().map(|s| s.to_string()),
            last_modified: response.last_modified().and_then(to_utc),
            content_length: response.content_length(),
            e_tag: response.e_tag().map(|s| s.to_string()),
            version_id: response.version_id().map(|s| s.to_string()),
            cache_control: response.cache_control().map(|s| s.to_string()),
            content_encoding: response.content_encoding().map(|s| s.to_string()),
            content_type: response.content_type().map(|s| s.to_string()),
            storage_class: response.storage_class().map(|s| s.as_str().to_string()),
            delete_marker: response.delete_marker(),
            metadata: user_metadata(response.metadata()),
        };

        Ok(GetObjectOutput {
            metadata,
            body: response.body,
        })
    }

    async fn delete_object(&self, request: DeleteObjectRequest) -> Result<DeleteObjectOutput> {
        let response = self
            .delete_object()
            .bucket(request.bucket)
            .key(request.key)
            .send()
            .await
            .map_err(|e| sdk_error("delete_object", e))?;

        Ok(DeleteObjectOutput {
            delete_marker: response.delete_marker(),
            version_id: response.version_id().map(|s| s.to_string()),
        })
    }

    async fn list_objects_v2(&self, request: ListObjectsV2Request) -> Result<ListObjectsV2Output> {
        let response = self
            .list_objects_v2()
            .bucket(request.bucket)
            .set_prefix(request.prefix)
            .set_max_keys(request.max_keys)
            .set_continuation_token(request.continuation_token)
            .set_delimiter(request.delimiter)
            .send()
            .await
            .map_err(|e| sdk_error("list_objects_v2", e))?;

        let contents = response
            .contents()
            .iter()
            .map(|obj| ObjectSummary {
                key: obj.key().unwrap_or_default().to_string(),
                last_modified: obj.last_modified().and_then(to_utc),
                e_tag: obj.e_tag().map(|s| s.to_string()),
                size: obj.size().unwrap_or(0),
                storage_class: obj.storage_class().map(|s| s.as_str().to_string()),
            })
            .collect();

        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix())
            .map(|p| CommonPrefix {
                prefix: p.to_string(),
            })
            .collect();

        Ok(ListObjectsV2Output {
            name: response.name().map(|s| s.to_string()),
            prefix: response.prefix().map(|s| s.to_string()),
            delimiter: response.delimiter().map(|s| s.to_string()),
            max_keys: response.max_keys(),
            key_count: response.key_count(),
            is_truncated: response.is_truncated().unwrap_or(false),
            contents,
            common_prefixes,
            continuation_token: response.continuation_token().map(|s| s.to_string()),
            next_continuation_token: response.next_continuation_token().map(|s| s.to_string()),
        })
    }

    async fn head_object(&self, request: HeadObjectRequest) -> Result<HeadObjectOutput> {
        let response = self
            .head_object()
            .bucket(request.bucket)
            .key(request.key)
            .set_if_match(request.if_match)
            .set_if_none_match(request.if_none_match)
            .set_version_id(request.version_id)
            .send()
            .await
            .map_err(|e| sdk_error("head_object", e))?;

        Ok(ObjectMetadata {
            accept_ranges: response.accept_ranges().map(|s| s.to_string()),
            last_modified: response.last_modified().and_then(to_utc),
            content_length: response.content_length(),
            e_tag: response.e_tag().map(|s| s.to_string()),
            version_id: response.version_id().map(|s| s.to_string()),
            cache_control: response.cache_control().map(|s| s.to_string()),
            content_encoding: response.content_encoding().map(|s| s.to_string()),
            content_type: response.content_type().map(|s| s.to_string()),
            storage_class: response.storage_class().map(|s| s.as_str().to_string()),
            delete_marker: response.delete_marker(),
            metadata: user_metadata(response.metadata()),
        })
    }

    async fn copy_object(&self, request: CopyObjectRequest) -> Result<CopyObjectOutput> {
        let response = self
            .copy_object()
            .copy_source(request.copy_source.to_header())
            .bucket(request.bucket)
            .key(request.key)
            .send()
            .await
            .map_err(|e| sdk_error("copy_object", e))?;

        Ok(CopyObjectOutput {
            copy_object_result: response.copy_object_result().map(|r| CopyObjectResult {
                e_tag: r.e_tag().map(|s| s.to_string()),
                last_modified: r.last_modified().and_then(to_utc),
            }),
            version_id: response.version_id().map(|s| s.to_string()),
            copy_source_version_id: response.copy_source_version_id().map(|s| s.to_string()),
        })
    }

    async fn delete_objects(&self, request: DeleteObjectsRequest) -> Result<DeleteObjectsOutput> {
        let objects = request
            .delete
            .objects
            .into_iter()
            .map(|o| ObjectIdentifier::builder().key(o.key).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| GatewayError::InvalidArgument(e.to_string()))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(request.delete.quiet)
            .build()
            .map_err(|e| GatewayError::InvalidArgument(e.to_string()))?;

        let response = self
            .delete_objects()
            .bucket(request.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| sdk_error("delete_objects", e))?;

        Ok(DeleteObjectsOutput {
            deleted: response
                .deleted()
                .iter()
                .map(|d| DeletedObject {
                    key: d.key().unwrap_or_default().to_string(),
                    version_id: d.version_id().map(|s| s.to_string()),
                    delete_marker: d.delete_marker(),
                })
                .collect(),
            errors: response
                .errors()
                .iter()
                .map(|e| DeleteFailure {
                    key: e.key().unwrap_or_default().to_string(),
                    version_id: e.version_id().map(|s| s.to_string()),
                    code: e.code().unwrap_or("unknown").to_string(),
                    message: e.message().unwrap_or_default().to_string(),
                })
                .collect(),
        })
    }

    async fn upload_file(&self, request: UploadFileRequest) -> Result<()> {
        let body = ByteStream::from_path(&request.filename)
            .await
            .map_err(|e| GatewayError::local_io(&request.filename, std::io::Error::other(e)))?;

        self.put_object()
            .bucket(request.bucket)
            .key(request.key)
            .body(body)
            .send()
            .await
            .map_err(|e| sdk_error("upload_file", e))?;

        Ok(())
    }

    async fn download_file(&self, request: DownloadFileRequest) -> Result<()> {
        let response = self
            .get_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .send()
            .await
            .map_err(|e| sdk_error("download_file", e))?;

        // The object exists; stream it to a staged file and swap it in
        transfer::save_atomically(
            "download_file",
            transfer::body_chunks(response.body),
            &request.filename,
        )
        .await?;

        Ok(())
    }
}
