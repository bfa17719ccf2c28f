use cadence_core::{config::ChannelsConfig, ChannelLimits, ChannelType};
use cadence_scheduler::ChannelCatalog;

/// Channel limits from `[channels.*.limits]`, falling back to platform defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigCatalog {
    channels: ChannelsConfig,
}

impl ConfigCatalog {
    pub fn new(channels: ChannelsConfig) -> Self {
        Self { channels }
    }
}

impl ChannelCatalog for ConfigCatalog {
    fn get_limits(&self, channel: ChannelType) -> ChannelLimits {
        self.channels.limits_for(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::config::{LimitsOverride, MastodonConfig};

    #[test]
    fn overrides_apply_per_channel() {
        let catalog = ConfigCatalog::new(ChannelsConfig {
            x: None,
            mastodon: Some(MastodonConfig {
                limits: LimitsOverride {
                    max_text_length: Some(5000),
                    ..Default::default()
                },
            }),
        });
        assert_eq!(catalog.get_limits(ChannelType::Mastodon).max_text_length, 5000);
        assert_eq!(
            catalog.get_limits(ChannelType::X),
            ChannelLimits::defaults_for(ChannelType::X)
        );
    }
}
