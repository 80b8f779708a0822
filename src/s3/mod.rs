//! S3 backend module
//!
//! - [`backend::StorageBackend`] - the client interface operations call
//! - [`client`] - AWS SDK implementation and connector
//! - [`mock`] - in-memory recording backend
//! - [`transfer`] - staged writes of object bodies to local files
//! - [`types`] - request and result records

pub mod backend;
pub mod client;
pub mod mock;
pub mod transfer;
pub mod types;

// Re-export commonly used types
pub use backend::{BackendConnector, StorageBackend};
pub use client::{S3ClientConfig, S3Connector};
pub use mock::{MockBackend, MockConnector};
