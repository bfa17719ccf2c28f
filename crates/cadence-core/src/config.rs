use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::CadenceError;
use crate::types::{ChannelLimits, ChannelType};

pub const DEFAULT_PORT: u16 = 8087;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_X_BASE_URL: &str = "https://api.x.com";
/// Headroom a lease must keep over the publish timeout, so a live attempt is
/// never reclaimed as stale by another worker.
pub const LEASE_MARGIN_SECS: u64 = 10;

/// Top-level config (cadence.toml + CADENCE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Poller and coordinator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between poll ticks.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Maximum schedules claimed per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// A `processing` row older than this is treated as abandoned.
    #[serde(default = "default_lease_timeout")]
    pub lease_timeout_secs: u64,
    /// Upper bound on a single adapter publish call.
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_publishes: usize,
    /// Stable worker identity recorded on leases. Random when unset.
    #[serde(default)]
    pub worker_id: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            lease_timeout_secs: default_lease_timeout(),
            publish_timeout_secs: default_publish_timeout(),
            max_concurrent_publishes: default_max_concurrent(),
            worker_id: None,
        }
    }
}

/// Retry ceiling and exponential backoff parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    /// Fraction of the computed delay added as random jitter (0.0 ..= 1.0).
    #[serde(default = "default_jitter")]
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            jitter_fraction: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub x: Option<XConfig>,
    #[serde(default)]
    pub mastodon: Option<MastodonConfig>,
}

impl ChannelsConfig {
    /// Effective limits for `channel`: config overrides on top of built-in defaults.
    pub fn limits_for(&self, channel: ChannelType) -> ChannelLimits {
        let overrides = match channel {
            ChannelType::X => self.x.as_ref().map(|c| &c.limits),
            ChannelType::Mastodon => self.mastodon.as_ref().map(|c| &c.limits),
        };
        let mut limits = ChannelLimits::defaults_for(channel);
        if let Some(o) = overrides {
            o.apply(&mut limits);
        }
        limits
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XConfig {
    #[serde(default = "default_x_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub limits: LimitsOverride,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MastodonConfig {
    #[serde(default)]
    pub limits: LimitsOverride,
}

/// Optional per-field overrides of [`ChannelLimits`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsOverride {
    pub max_text_length: Option<usize>,
    pub max_images: Option<usize>,
    pub max_videos: Option<usize>,
    pub max_media: Option<usize>,
}

impl LimitsOverride {
    fn apply(&self, limits: &mut ChannelLimits) {
        if let Some(v) = self.max_text_length {
            limits.max_text_length = v;
        }
        if let Some(v) = self.max_images {
            limits.max_images = v;
        }
        if let Some(v) = self.max_videos {
            limits.max_videos = v;
        }
        if let Some(v) = self.max_media {
            limits.max_media = v;
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_poll_interval() -> u64 {
    5
}
fn default_batch_size() -> usize {
    50
}
fn default_lease_timeout() -> u64 {
    300
}
fn default_publish_timeout() -> u64 {
    30
}
fn default_max_concurrent() -> usize {
    8
}
fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay() -> u64 {
    30
}
fn default_max_delay() -> u64 {
    3600
}
fn default_jitter() -> f64 {
    0.1
}
fn default_x_base_url() -> String {
    DEFAULT_X_BASE_URL.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.db", home)
}

impl CadenceConfig {
    /// Load config from a TOML file with CADENCE_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `CADENCE_SCHEDULER__BATCH_SIZE=100`. A missing file is not an error;
    /// defaults apply.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        tracing::debug!(path = %path, "loading config");

        let config: Self = Figment::from(Serialized::defaults(CadenceConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CADENCE_").split("__"))
            .extract()
            .map_err(|e| CadenceError::Config(e.to_string()))?;
        config.scheduler.validate()?;
        Ok(config)
    }
}

impl SchedulerConfig {
    /// Reject timeout combinations under which a lease can expire while its
    /// publish call is still running.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.publish_timeout_secs == 0 {
            return Err(CadenceError::Config(
                "scheduler.publish_timeout_secs must be greater than 0".into(),
            ));
        }
        let min_lease = self.publish_timeout_secs.saturating_add(LEASE_MARGIN_SECS);
        if self.lease_timeout_secs < min_lease {
            return Err(CadenceError::Config(format!(
                "scheduler.lease_timeout_secs ({}) must be at least publish_timeout_secs + {LEASE_MARGIN_SECS} ({min_lease})",
                self.lease_timeout_secs
            )));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_override_only_touches_set_fields() {
        let channels = ChannelsConfig {
            x: Some(XConfig {
                base_url: default_x_base_url(),
                limits: LimitsOverride {
                    max_text_length: Some(25_000),
                    ..Default::default()
                },
            }),
            mastodon: None,
        };
        let x = channels.limits_for(ChannelType::X);
        assert_eq!(x.max_text_length, 25_000);
        assert_eq!(x.max_images, 4);
        assert_eq!(
            channels.limits_for(ChannelType::Mastodon),
            ChannelLimits::defaults_for(ChannelType::Mastodon)
        );
    }

    #[test]
    fn load_reads_toml_over_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "cadence.toml",
                r#"
                [scheduler]
                batch_size = 10

                [retry]
                max_attempts = 3
                "#,
            )?;
            jail.set_env("CADENCE_SCHEDULER__POLL_INTERVAL_SECS", "2");

            let cfg = CadenceConfig::load(Some("cadence.toml")).expect("load");
            assert_eq!(cfg.scheduler.batch_size, 10);
            assert_eq!(cfg.scheduler.poll_interval_secs, 2);
            assert_eq!(cfg.retry.max_attempts, 3);
            assert_eq!(cfg.retry.base_delay_secs, 30);
            assert_eq!(cfg.gateway.port, DEFAULT_PORT);
            Ok(())
        });
    }

    #[test]
    fn defaults_pass_validation() {
        SchedulerConfig::default().validate().unwrap();
    }

    #[test]
    fn lease_shorter_than_publish_timeout_is_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "cadence.toml",
                r#"
                [scheduler]
                lease_timeout_secs = 10
                publish_timeout_secs = 30
                "#,
            )?;
            let err = CadenceConfig::load(Some("cadence.toml")).unwrap_err();
            assert!(matches!(err, CadenceError::Config(_)));
            assert!(err.to_string().contains("lease_timeout_secs"));
            Ok(())
        });
    }

    #[test]
    fn lease_margin_is_inclusive() {
        let mut cfg = SchedulerConfig {
            publish_timeout_secs: 30,
            lease_timeout_secs: 30 + LEASE_MARGIN_SECS,
            ..Default::default()
        };
        cfg.validate().unwrap();
        cfg.lease_timeout_secs -= 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_publish_timeout_is_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CADENCE_SCHEDULER__PUBLISH_TIMEOUT_SECS", "0");
            let err = CadenceConfig::load(Some("missing.toml")).unwrap_err();
            assert!(err.to_string().contains("publish_timeout_secs"));
            Ok(())
        });
    }
}
