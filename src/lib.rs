//! S3 Operation Gateway Library
//!
//! Exposes S3 bucket and object operations as independently invocable, typed
//! operations for a tool-calling dispatcher:
//! - [`connection`] - lazily built, validated backend connection
//! - [`operations`] - the operation set ([`operations::Gateway`])
//! - [`normalize`] - body materialization and deterministic JSON rendering
//! - [`dispatch`] - operation catalogue and line-delimited JSON serving

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod normalize;
pub mod operations;
pub mod s3;

pub use connection::ConnectionManager;
pub use error::{GatewayError, Result};
pub use operations::Gateway;
