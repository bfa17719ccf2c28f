use async_trait::async_trait;
use cadence_core::{ChannelConnection, ChannelType};

use crate::types::{PublishRequest, PublishResult};

/// Common interface implemented by every platform adapter.
///
/// Implementations must be `Send + Sync` so a single instance can live in the
/// [`PublisherRegistry`](crate::registry::PublisherRegistry) and serve
/// concurrent publishes from multiple Tokio tasks.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Platform this adapter publishes to. Used as the registry key.
    fn channel_type(&self) -> ChannelType;

    /// Publish `request.content` through `connection`.
    ///
    /// Must reject content that violates `request.limits` with a permanent
    /// failure before touching the network, and must fold every transport or
    /// platform error into a classified
    /// [`PublishFailure`](crate::types::PublishFailure).
    async fn publish(&self, request: &PublishRequest, connection: &ChannelConnection)
        -> PublishResult;
}
