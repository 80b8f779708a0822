//! Lazy, validated connection to the storage backend
//!
//! The first [`ConnectionManager::acquire`] builds the client and validates it
//! with a bucket listing. A validated handle is kept for the life of the
//! process and never validated again. Failures are not kept: once an attempt has
//! ended, the next call starts over, so credentials injected after startup
//! are picked up.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OnceCell};

use crate::error::{GatewayError, Result};
use crate::s3::backend::{BackendConnector, StorageBackend};

/// Backend codes that mean the supplied credentials are unusable
const CREDENTIAL_ERROR_CODES: &[&str] = &[
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "InvalidToken",
    "TokenRefreshRequired",
];

/// Outcome of the most recent failed attempt
#[derive(Default)]
struct LastAttempt {
    failure: Option<GatewayError>,
}

pub struct ConnectionManager {
    connector: Box<dyn BackendConnector>,
    handle: OnceCell<Box<dyn StorageBackend>>,
    /// Held for the duration of one construct-and-validate attempt
    attempt: Mutex<LastAttempt>,
    /// Number of attempts that have finished; only changed under `attempt`
    finished: AtomicU64,
}

impl ConnectionManager {
    pub fn new(connector: impl BackendConnector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            handle: OnceCell::new(),
            attempt: Mutex::new(LastAttempt::default()),
            finished: AtomicU64::new(0),
        }
    }

    /// Return the validated backend, connecting on first use.
    ///
    /// At most one construction and validation run at a time. Callers that arrive
    /// while an attempt is in flight share its outcome: the same handle or
    /// the same failure.
    pub async fn acquire(&self) -> Result<&dyn StorageBackend> {
        if let Some(handle) = self.handle.get() {
            return Ok(&**handle);
        }

        let seen = self.finished.load(Ordering::Acquire);
        let mut last = self.attempt.lock().await;

        if let Some(handle) = self.handle.get() {
            return Ok(&**handle);
        }
        if self.finished.load(Ordering::Acquire) != seen {
            if let Some(failure) = &last.failure {
                return Err(replay(failure));
            }
        }

        let outcome = self.initialize().await;
        self.finished.fetch_add(1, Ordering::Release);

        match outcome {
            Ok(backend) => {
                last.failure = None;
                let handle = self.handle.get_or_init(|| async move { backend }).await;
                Ok(&**handle)
            }
            Err(err) => {
                last.failure = Some(replay(&err));
                Err(err)
            }
        }
    }

    /// Whether a validated handle is cached
    pub fn is_connected(&self) -> bool {
        self.handle.initialized()
    }

    async fn initialize(&self) -> Result<Box<dyn StorageBackend>> {
        tracing::info!("Initializing S3 client");

        let backend = self.connector.connect().await.map_err(|e| {
            let err = classify_failure(e);
            tracing::error!("Failed to create S3 client: {}", err);
            err
        })?;

        if let Err(e) = backend.list_buckets().await {
            let err = classify_failure(e);
            tracing::error!("S3 client validation failed: {}", err);
            return Err(err);
        }

        tracing::info!("Successfully initialized and validated S3 client");
        Ok(backend)
    }
}

/// Copy of a classified connection failure for callers sharing an attempt
fn replay(err: &GatewayError) -> GatewayError {
    match err {
        GatewayError::CredentialsUnavailable(message) => {
            GatewayError::CredentialsUnavailable(message.clone())
        }
        GatewayError::ConnectionFailed(message) => GatewayError::ConnectionFailed(message.clone()),
        other => GatewayError::ConnectionFailed(other.to_string()),
    }
}

/// Fold any connect or validation failure into the two connection error kinds
fn classify_failure(err: GatewayError) -> GatewayError {
    match err {
        e @ (GatewayError::CredentialsUnavailable(_) | GatewayError::ConnectionFailed(_)) => e,
        GatewayError::BackendRequest { code, message, .. }
            if CREDENTIAL_ERROR_CODES.contains(&code.as_str()) =>
        {
            GatewayError::CredentialsUnavailable(format!("{}: {}", code, message))
        }
        GatewayError::BackendRequest { code, message, .. } => {
            GatewayError::ConnectionFailed(format!("{}: {}", code, message))
        }
        other => GatewayError::ConnectionFailed(other.to_string()),
    }
}
