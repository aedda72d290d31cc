//! Transport boundary.

use async_trait::async_trait;
use serde_json::Value;
use strata_core::{RequestDescriptor, TransportError};

/// Opaque async fetch used for every query and mutation.
///
/// Implementations only have to distinguish success from failure; retries,
/// authentication and wire details are their own business.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one request and return the decoded payload.
    async fn fetch(&self, request: RequestDescriptor) -> Result<Value, TransportError>;
}
