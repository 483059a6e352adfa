//! Seams between the gateway core and the outside world.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::DomainError;

/// Unmodified upstream payload of one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub body: Value,
    /// Size of the body as received.
    pub size_bytes: usize,
}

impl RawDocument {
    #[must_use]
    pub fn new(body: Value, size_bytes: usize) -> Self {
        Self { body, size_bytes }
    }
}

/// Fetches one upstream document by path, retrying transient failures.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// `timeout` bounds each individual attempt.
    ///
    /// # Errors
    /// [`DomainError`] describing the final failed attempt.
    async fn fetch(&self, path: &str, timeout: Duration) -> Result<RawDocument, DomainError>;
}
