//! S3 request and result records
//!
//! Requests serialize to the backend's field names and skip every optional
//! field the caller left out, so the serialized form of a request is exactly
//! the parameter set sent to the backend. Results serialize the same way and
//! are what the normalizer renders.

use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    #[serde(skip)]
    pub body: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetObjectRequest {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteObjectRequest {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListObjectsV2Request {
    pub bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_keys: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

/// Conditional metadata lookup; the conditions pass through verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeadObjectRequest {
    pub bucket: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub if_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub if_none_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

/// Characters left as-is in the key part of `x-amz-copy-source`
const COPY_SOURCE_KEY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Source half of a server-side copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CopySource {
    pub bucket: String,
    pub key: String,
}

impl CopySource {
    /// `bucket/key` form expected by the CopyObject API. S3 URL-decodes the
    /// header, so the key is percent-encoded; the bucket and separator are not.
    pub fn to_header(&self) -> String {
        format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(&self.key, COPY_SOURCE_KEY)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CopyObjectRequest {
    pub copy_source: CopySource,
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectIdentifier {
    pub key: String,
}

/// Keys to delete and the reporting mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteSpec {
    pub objects: Vec<ObjectIdentifier>,
    pub quiet: bool,
}

impl DeleteSpec {
    pub fn new<I, S>(keys: I, quiet: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            objects: keys
                .into_iter()
                .map(|key| ObjectIdentifier { key: key.into() })
                .collect(),
            quiet,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteObjectsRequest {
    pub bucket: String,
    pub delete: DeleteSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadFileRequest {
    pub filename: PathBuf,
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DownloadFileRequest {
    pub bucket: String,
    pub key: String,
    pub filename: PathBuf,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Owner {
    #[serde(rename = "DisplayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListBucketsOutput {
    pub buckets: Vec<BucketSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutObjectOutput {
    #[serde(rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_side_encryption: Option<String>,
}

/// Object metadata shared by get-object and head-object results
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_ranges: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<i64>,
    #[serde(rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_marker: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

pub type HeadObjectOutput = ObjectMetadata;

/// Raw get-object result; the body has not been read yet
#[derive(Debug)]
pub struct GetObjectOutput {
    pub metadata: ObjectMetadata,
    pub body: ByteStream,
}

/// Get-object result after the body has been drained and decoded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetObjectResult {
    #[serde(flatten)]
    pub metadata: ObjectMetadata,
    #[serde(rename = "Body")]
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteObjectOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_marker: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectSummary {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommonPrefix {
    pub prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListObjectsV2Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_keys: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_count: Option<i32>,
    pub is_truncated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<ObjectSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub common_prefixes: Vec<CommonPrefix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CopyObjectResult {
    #[serde(rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CopyObjectOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_object_result: Option<CopyObjectResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_source_version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeletedObject {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_marker: Option<bool>,
}

/// A key the backend refused to delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteFailure {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteObjectsOutput {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<DeletedObject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<DeleteFailure>,
}

/// Acknowledgment for file transfers; never carries the transferred bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferAck {
    pub status: String,
    pub message: String,
    pub bucket: String,
    pub key: String,
    pub filename: String,
}

impl TransferAck {
    pub fn uploaded(request: &UploadFileRequest) -> Self {
        let filename = request.filename.display().to_string();
        Self {
            status: "success".to_string(),
            message: format!(
                "File '{}' uploaded to '{}/{}'.",
                filename, request.bucket, request.key
            ),
            bucket: request.bucket.clone(),
            key: request.key.clone(),
            filename,
        }
    }

    pub fn downloaded(request: &DownloadFileRequest) -> Self {
        let filename = request.filename.display().to_string();
        Self {
            status: "success".to_string(),
            message: format!(
                "File '{}' from bucket '{}' downloaded to '{}'.",
                request.key, request.bucket, filename
            ),
            bucket: request.bucket.clone(),
            key: request.key.clone(),
            filename,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_objects_request_omits_absent_fields() {
        let request = ListObjectsV2Request {
            bucket: "logs".to_string(),
            prefix: None,
            max_keys: None,
            continuation_token: None,
            delimiter: None,
        };
        assert_eq!(serde_json::to_value(&request).unwrap(), json!({"Bucket": "logs"}));
    }

    #[test]
    fn test_list_objects_request_field_names() {
        let request = ListObjectsV2Request {
            bucket: "logs".to_string(),
            prefix: Some("2024/".to_string()),
            max_keys: Some(50),
            continuation_token: Some("T".to_string()),
            delimiter: Some("/".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "Bucket": "logs",
                "Prefix": "2024/",
                "MaxKeys": 50,
                "ContinuationToken": "T",
                "Delimiter": "/"
            })
        );
    }

    #[test]
    fn test_head_object_request_field_names() {
        let request = HeadObjectRequest {
            bucket: "b".to_string(),
            key: "k".to_string(),
            if_match: None,
            if_none_match: Some("\"abc\"".to_string()),
            version_id: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"Bucket": "b", "Key": "k", "IfNoneMatch": "\"abc\""})
        );
    }

    #[test]
    fn test_delete_spec_preserves_key_order() {
        let spec = DeleteSpec::new(["c", "a", "b"], true);
        let keys: Vec<&str> = spec.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"Objects": [{"Key": "c"}, {"Key": "a"}, {"Key": "b"}], "Quiet": true})
        );
    }

    #[test]
    fn test_copy_source_header() {
        let source = CopySource {
            bucket: "src-bucket".to_string(),
            key: "dir/file.txt".to_string(),
        };
        assert_eq!(source.to_header(), "src-bucket/dir/file.txt");
    }

    #[test]
    fn test_copy_source_header_encodes_key() {
        let source = CopySource {
            bucket: "src".to_string(),
            key: "dir/a b+c%20d.txt".to_string(),
        };
        assert_eq!(source.to_header(), "src/dir/a%20b%2Bc%2520d.txt");

        let source = CopySource {
            bucket: "src".to_string(),
            key: "q?x#y/\u{e9}t\u{e9}.csv".to_string(),
        };
        assert_eq!(source.to_header(), "src/q%3Fx%23y/%C3%A9t%C3%A9.csv");
    }

    #[test]
    fn test_put_object_request_skips_body() {
        let request = PutObjectRequest {
            bucket: "b".to_string(),
            key: "k".to_string(),
            body: Bytes::from_static(b"hello"),
            content_type: None,
        };
        assert_eq!(serde_json::to_value(&request).unwrap(), json!({"Bucket": "b", "Key": "k"}));
    }

    #[test]
    fn test_get_object_result_flattens_metadata() {
        let result = GetObjectResult {
            metadata: ObjectMetadata {
                content_length: Some(5),
                e_tag: Some("\"etag\"".to_string()),
                ..Default::default()
            },
            body: "hello".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"ContentLength": 5, "ETag": "\"etag\"", "Body": "hello"})
        );
    }

    #[test]
    fn test_delete_objects_output_omits_empty_lists() {
        let output = DeleteObjectsOutput {
            deleted: Vec::new(),
            errors: vec![DeleteFailure {
                key: "b".to_string(),
                version_id: None,
                code: "AccessDenied".to_string(),
                message: "Access Denied".to_string(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({"Errors": [{"Key": "b", "Code": "AccessDenied", "Message": "Access Denied"}]})
        );
    }

    #[test]
    fn test_transfer_ack_messages() {
        let upload = UploadFileRequest {
            filename: PathBuf::from("/tmp/report.csv"),
            bucket: "data".to_string(),
            key: "reports/report.csv".to_string(),
        };
        let ack = TransferAck::uploaded(&upload);
        assert_eq!(ack.status, "success");
        assert_eq!(
            ack.message,
            "File '/tmp/report.csv' uploaded to 'data/reports/report.csv'."
        );

        let download = DownloadFileRequest {
            bucket: "data".to_string(),
            key: "reports/report.csv".to_string(),
            filename: PathBuf::from("/tmp/copy.csv"),
        };
        let ack = TransferAck::downloaded(&download);
        assert_eq!(
            ack.message,
            "File 'reports/report.csv' from bucket 'data' downloaded to '/tmp/copy.csv'."
        );
        assert_eq!(ack.filename, "/tmp/copy.csv");
    }
}
