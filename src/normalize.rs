//! Response normalization
//!
//! Turns typed backend results into JSON. Object bodies are drained and
//! decoded here, timestamps become RFC 3339 strings, and the final text is
//! pretty-printed with sorted keys so equal results render byte-identically.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{GatewayError, Result};
use crate::s3::types::{GetObjectOutput, GetObjectResult};

/// Convert an SDK timestamp, dropping values chrono cannot represent
pub fn to_utc(timestamp: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

/// Read the object body to completion and decode it as UTF-8 text
pub async fn materialize(raw: GetObjectOutput) -> Result<GetObjectResult> {
    let bytes = raw
        .body
        .collect()
        .await
        .map_err(|e| GatewayError::BackendRequest {
            operation: "get_object",
            code: "N/A".to_string(),
            message: format!("failed to read object body: {}", e),
        })?
        .into_bytes();

    Ok(GetObjectResult {
        metadata: raw.metadata,
        body: decode_body(bytes)?,
    })
}

fn decode_body(bytes: Bytes) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| {
        GatewayError::Serialization(format!(
            "object body is not UTF-8 text ({} bytes): {}",
            bytes.len(),
            e.utf8_error()
        ))
    })
}

/// Convert a result record into a JSON value with sorted object keys
pub fn normalize<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| GatewayError::Serialization(e.to_string()))
}

/// Pretty-print a normalized value with two-space indentation
pub fn render(value: &serde_json::Value) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| GatewayError::Serialization(e.to_string()))
}
