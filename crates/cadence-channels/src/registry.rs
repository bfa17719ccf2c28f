use std::collections::HashMap;
use std::sync::Arc;

use cadence_core::ChannelType;
use tracing::info;

use crate::publisher::Publisher;

/// Lookup of publisher adapters by channel type.
///
/// Adapters are shared behind `Arc` so the coordinator can run several
/// publishes against the same adapter concurrently.
#[derive(Clone, Default)]
pub struct PublisherRegistry {
    publishers: HashMap<ChannelType, Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. An adapter already registered for the same
    /// channel type is replaced.
    pub fn register(&mut self, publisher: Arc<dyn Publisher>) {
        let channel = publisher.channel_type();
        info!(channel = %channel, "registering publisher adapter");
        self.publishers.insert(channel, publisher);
    }

    pub fn get(&self, channel: ChannelType) -> Option<Arc<dyn Publisher>> {
        self.publishers.get(&channel).cloned()
    }

    /// Registered channel types, sorted for deterministic output.
    pub fn channel_types(&self) -> Vec<ChannelType> {
        let mut types: Vec<ChannelType> = self.publishers.keys().copied().collect();
        types.sort_by_key(|c| c.as_str());
        types
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}
