//! Streaming object bodies to local files
//!
//! Downloads are staged in a temporary file next to the target and renamed
//! into place only once the whole body has been written. A failed transfer
//! leaves any existing file at the target untouched.

use aws_sdk_s3::primitives::{ByteStream, ByteStreamError};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::error::{GatewayError, Result};

/// Chunks of an SDK body, in order
pub fn body_chunks(
    body: ByteStream,
) -> impl Stream<Item = std::result::Result<Bytes, ByteStreamError>> {
    futures::stream::try_unfold(body, |mut body| async move {
        let next = body.try_next().await;
        next.map(|chunk| chunk.map(|chunk| (chunk, body)))
    })
}

/// Write `chunks` to `target`, replacing it only on success. Read failures are
/// reported against `operation`; filesystem failures as local I/O errors.
pub async fn save_atomically<S, E>(operation: &'static str, chunks: S, target: &Path) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let staging =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| GatewayError::local_io(target, e))?;
    let (file, staged_path) = staging.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    futures::pin_mut!(chunks);
    let mut written = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| GatewayError::BackendRequest {
            operation,
            code: "N/A".to_string(),
            message: format!("failed to read object body: {}", e),
        })?;
        file.write_all(&chunk)
            .await
            .map_err(|e| GatewayError::local_io(target, e))?;
        written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| GatewayError::local_io(target, e))?;
    drop(file);

    staged_path
        .persist(target)
        .map_err(|e| GatewayError::local_io(target, e.error))?;

    tracing::debug!("Wrote {} bytes to {}", written, target.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_save_writes_all_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"01234")),
            Ok(Bytes::from_static(b"56789")),
        ]);

        let written = save_atomically("download_file", chunks, &target).await.unwrap();

        assert_eq!(written, 10);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "0123456789");
        assert_eq!(entries(dir.path()), vec!["out.txt"]);
    }

    #[tokio::test]
    async fn test_failed_read_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        std::fs::write(&target, "PREVIOUS GOOD CONTENT").unwrap();

        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"0123456789")),
            Err("connection reset before end of body"),
        ]);

        let err = save_atomically("download_file", chunks, &target)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "backend_request_error");
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "PREVIOUS GOOD CONTENT"
        );
        assert_eq!(entries(dir.path()), vec!["out.txt"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_local_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("out.txt");
        let chunks = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"x"))]);

        let err = save_atomically("download_file", chunks, &target)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "local_io_error");
    }

    #[tokio::test]
    async fn test_body_chunks_drains_byte_stream() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("body.bin");

        let body = ByteStream::from_static(b"streamed body");
        save_atomically("download_file", body_chunks(body), &target)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"streamed body");
    }
}
