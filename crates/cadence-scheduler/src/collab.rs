//! Contracts for the stores the coordinator reads from but does not own.
//!
//! The scheduler never writes variant or connection rows; the only write it
//! issues is [`VariantStore::mark_published`] after a successful attempt.

use async_trait::async_trait;
use cadence_core::{ChannelConnection, ChannelLimits, ChannelType, Result, VariantContent};
use chrono::{DateTime, Utc};

#[async_trait]
pub trait VariantStore: Send + Sync {
    /// Text and media of a post variant. `Ok(None)` if it does not exist.
    async fn get_variant(&self, variant_id: &str) -> Result<Option<VariantContent>>;

    /// Flag the variant as published at `at`.
    async fn mark_published(&self, variant_id: &str, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn get_connection(&self, connection_id: &str) -> Result<Option<ChannelConnection>>;
}

/// Per-channel content limits.
pub trait ChannelCatalog: Send + Sync {
    fn get_limits(&self, channel: ChannelType) -> ChannelLimits;
}

/// Catalog that always answers with the built-in platform limits.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCatalog;

impl ChannelCatalog for DefaultCatalog {
    fn get_limits(&self, channel: ChannelType) -> ChannelLimits {
        ChannelLimits::defaults_for(channel)
    }
}
