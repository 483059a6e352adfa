use async_trait::async_trait;

use crate::error::GatewayError;
use crate::identity::{ResourceClass, ResourceIdentity};
use crate::models::{ShapedResult, ShapingPolicy};

/// Public API of the WCA gateway, consumed by the query-dispatch layer.
///
/// Implementations are safe to call concurrently; identical concurrent requests
/// share one upstream fetch.
#[async_trait]
pub trait WcaGatewayClient: Send + Sync {
    /// Resolve a resource into a shaped view.
    ///
    /// `class` must be the identity's natural class ([`ResourceIdentity::class`]).
    ///
    /// # Errors
    /// One of the [`GatewayError`] kinds, naming `identity` (and `policy` for
    /// [`GatewayError::RoundNotFound`]).
    async fn resolve(
        &self,
        identity: &ResourceIdentity,
        class: ResourceClass,
        policy: &ShapingPolicy,
    ) -> Result<ShapedResult, GatewayError>;

    /// Drop every cached view of `identity`, forcing the next resolve to refetch.
    async fn invalidate(&self, identity: &ResourceIdentity);
}
