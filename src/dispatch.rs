//! Operation catalogue
//!
//! Maps an operation name plus a JSON argument bag onto one gateway
//! operation and returns the normalized result. [`serve`] wraps this in a
//! line-delimited JSON loop: one request object per input line, one reply
//! object per output line.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ErrorReport, GatewayError, Result};
use crate::normalize::{normalize, render};
use crate::operations::{
    CopyObjectArgs, DeleteObjectsArgs, DownloadFileArgs, Gateway, HeadObjectArgs,
    ListObjectsArgs, ObjectArgs, PutObjectArgs, UploadFileArgs,
};

/// Every operation name the gateway answers to
pub const OPERATIONS: &[&str] = &[
    "list_buckets",
    "put_object",
    "get_object",
    "delete_object",
    "list_objects_v2",
    "head_object",
    "upload_file",
    "download_file",
    "copy_object",
    "delete_objects",
];

/// A decoded operation invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    ListBuckets,
    PutObject(PutObjectArgs),
    GetObject(ObjectArgs),
    DeleteObject(ObjectArgs),
    ListObjectsV2(ListObjectsArgs),
    HeadObject(HeadObjectArgs),
    UploadFile(UploadFileArgs),
    DownloadFile(DownloadFileArgs),
    CopyObject(CopyObjectArgs),
    DeleteObjects(DeleteObjectsArgs),
}

fn decode_args<T: serde::de::DeserializeOwned>(tool: &str, arguments: Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| GatewayError::InvalidArgument(format!("{}: {}", tool, e)))
}

impl ToolCall {
    /// Decode `arguments` for the named operation. A missing argument bag is
    /// treated as empty.
    pub fn parse(tool: &str, arguments: Value) -> Result<Self> {
        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        let call = match tool {
            "list_buckets" => {
                let _: NoArgs = decode_args(tool, arguments)?;
                ToolCall::ListBuckets
            }
            "put_object" => ToolCall::PutObject(decode_args(tool, arguments)?),
            "get_object" => ToolCall::GetObject(decode_args(tool, arguments)?),
            "delete_object" => ToolCall::DeleteObject(decode_args(tool, arguments)?),
            "list_objects_v2" => ToolCall::ListObjectsV2(decode_args(tool, arguments)?),
            "head_object" => ToolCall::HeadObject(decode_args(tool, arguments)?),
            "upload_file" => ToolCall::UploadFile(decode_args(tool, arguments)?),
            "download_file" => ToolCall::DownloadFile(decode_args(tool, arguments)?),
            "copy_object" => ToolCall::CopyObject(decode_args(tool, arguments)?),
            "delete_objects" => ToolCall::DeleteObjects(decode_args(tool, arguments)?),
            unknown => {
                return Err(GatewayError::InvalidArgument(format!(
                    "unknown operation '{}'",
                    unknown
                )))
            }
        };

        Ok(call)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ListBuckets => "list_buckets",
            ToolCall::PutObject(_) => "put_object",
            ToolCall::GetObject(_) => "get_object",
            ToolCall::DeleteObject(_) => "delete_object",
            ToolCall::ListObjectsV2(_) => "list_objects_v2",
            ToolCall::HeadObject(_) => "head_object",
            ToolCall::UploadFile(_) => "upload_file",
            ToolCall::DownloadFile(_) => "download_file",
            ToolCall::CopyObject(_) => "copy_object",
            ToolCall::DeleteObjects(_) => "delete_objects",
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

impl Gateway {
    /// Run one operation and return its normalized result
    pub async fn call(&self, call: ToolCall) -> Result<Value> {
        match call {
            ToolCall::ListBuckets => normalize(&self.list_buckets().await?),
            ToolCall::PutObject(args) => normalize(&self.put_object(args).await?),
            ToolCall::GetObject(args) => normalize(&self.get_object(args).await?),
            ToolCall::DeleteObject(args) => normalize(&self.delete_object(args).await?),
            ToolCall::ListObjectsV2(args) => normalize(&self.list_objects_v2(args).await?),
            ToolCall::HeadObject(args) => normalize(&self.head_object(args).await?),
            ToolCall::UploadFile(args) => normalize(&self.upload_file(args).await?),
            ToolCall::DownloadFile(args) => normalize(&self.download_file(args).await?),
            ToolCall::CopyObject(args) => normalize(&self.copy_object(args).await?),
            ToolCall::DeleteObjects(args) => normalize(&self.delete_objects(args).await?),
        }
    }

    /// Decode, run and render one operation as pretty-printed JSON text
    pub async fn invoke(&self, tool: &str, arguments: Value) -> Result<String> {
        let call = ToolCall::parse(tool, arguments)?;
        render(&self.call(call).await?)
    }
}

/// One line of input
#[derive(Debug, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

/// One line of output
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Success { ok: bool, result: Value },
    Failure { ok: bool, error: ErrorReport },
}

impl Reply {
    pub fn success(result: Value) -> Self {
        Reply::Success { ok: true, result }
    }

    pub fn failure(error: &GatewayError) -> Self {
        Reply::Failure {
            ok: false,
            error: error.report(),
        }
    }
}

/// Answer one request line
pub async fn handle_line(gateway: &Gateway, line: &str) -> Reply {
    let request: ToolRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            let err = GatewayError::InvalidArgument(format!("malformed request: {}", e));
            tracing::warn!("{}", err);
            return Reply::failure(&err);
        }
    };

    let outcome = match ToolCall::parse(&request.tool, request.arguments) {
        Ok(call) => gateway.call(call).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(result) => Reply::success(result),
        Err(e) => {
            tracing::error!("{} failed: {}", request.tool, e);
            Reply::failure(&e)
        }
    }
}

/// Serve requests from `reader` until end of input
pub async fn serve<R, W>(gateway: &Gateway, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = handle_line(gateway, &line).await;
        let mut encoded = serde_json::to_vec(&reply).map_err(std::io::Error::other)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }

    tracing::info!("Input closed, shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionManager;
    use crate::s3::mock::{MockBackend, MockConnector};
    use serde_json::json;

    fn gateway(backend: &MockBackend) -> Gateway {
        Gateway::new(ConnectionManager::new(MockConnector::new(backend.clone())))
    }

    #[test]
    fn test_parse_every_catalogue_entry() {
        let samples = [
            ("list_buckets", json!(null)),
            ("put_object", json!({"bucket": "b", "key": "k", "body": "x"})),
            ("get_object", json!({"bucket": "b", "key": "k"})),
            ("delete_object", json!({"bucket": "b", "key": "k"})),
            ("list_objects_v2", json!({"bucket": "b"})),
            ("head_object", json!({"bucket": "b", "key": "k"})),
            ("upload_file", json!({"filename": "/tmp/f", "bucket": "b", "key": "k"})),
            ("download_file", json!({"bucket": "b", "key": "k", "filename": "/tmp/f"})),
            (
                "copy_object",
                json!({
                    "source_bucket": "a",
                    "source_key": "x",
                    "destination_bucket": "b",
                    "destination_key": "y"
                }),
            ),
            ("delete_objects", json!({"bucket": "b", "keys": ["k"]})),
        ];

        assert_eq!(samples.len(), OPERATIONS.len());
        for (tool, arguments) in samples {
            let call = ToolCall::parse(tool, arguments).expect(tool);
            assert_eq!(call.name(), tool);
            assert!(OPERATIONS.contains(&call.name()));
        }
    }

    #[test]
    fn test_parse_unknown_operation() {
        let err = ToolCall::parse("create_bucket", json!({})).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
        assert!(err.to_string().contains("create_bucket"));
    }

    #[test]
    fn test_parse_missing_required_argument() {
        let err = ToolCall::parse("get_object", json!({"bucket": "b"})).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
        assert!(err.to_string().contains("key"));
    }

    #[test]
    fn test_delete_objects_quiet_defaults_false() {
        match ToolCall::parse("delete_objects", json!({"bucket": "b", "keys": ["a"]})).unwrap() {
            ToolCall::DeleteObjects(args) => assert!(!args.quiet),
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invoke_renders_pretty_json() {
        let backend = MockBackend::new().with_bucket("alpha").with_bucket("beta");
        let gateway = gateway(&backend);

        let text = gateway.invoke("list_buckets", json!({})).await.unwrap();
        assert_eq!(
            text,
            "{\n  \"Buckets\": [\n    {\n      \"Name\": \"alpha\"\n    },\n    {\n      \"Name\": \"beta\"\n    }\n  ]\n}"
        );
    }

    #[tokio::test]
    async fn test_call_value_is_what_invoke_renders() {
        let backend = MockBackend::new().with_object("b", "k", "hello");
        let gateway = gateway(&backend);

        let value = gateway
            .call(ToolCall::parse("head_object", json!({"bucket": "b", "key": "k"})).unwrap())
            .await
            .unwrap();
        let text = gateway
            .invoke("head_object", json!({"bucket": "b", "key": "k"}))
            .await
            .unwrap();

        assert_eq!(value["ContentLength"], json!(5));
        assert_eq!(render(&value).unwrap(), text);
    }

    #[tokio::test]
    async fn test_serve_answers_each_line() {
        let backend = MockBackend::new().with_object("b", "k", "hello");
        let gateway = gateway(&backend);

        let input = concat!(
            r#"{"tool": "get_object", "arguments": {"bucket": "b", "key": "k"}}"#,
            "\n\n",
            "not json\n",
            r#"{"tool": "get_object", "arguments": {"bucket": "b", "key": "nope"}}"#,
            "\n",
        );
        let mut output = Vec::new();
        serve(&gateway, input.as_bytes(), &mut output).await.unwrap();

        let replies: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["ok"], json!(true));
        assert_eq!(replies[0]["result"]["Body"], json!("hello"));
        assert_eq!(replies[1]["ok"], json!(false));
        assert_eq!(replies[1]["error"]["kind"], json!("invalid_argument"));
        assert_eq!(replies[2]["error"]["kind"], json!("backend_request_error"));
        assert!(replies[2]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("NoSuchKey"));
    }
}
