use serde::{Deserialize, Serialize};
use std::fmt;

/// External platform a channel connection publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    X,
    Mastodon,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::X => "x",
            ChannelType::Mastodon => "mastodon",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "x" | "twitter" => Ok(ChannelType::X),
            "mastodon" => Ok(ChannelType::Mastodon),
            other => Err(format!("unknown channel type: {other}")),
        }
    }
}

/// Health of an authenticated destination account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "connected" => Ok(ConnectionStatus::Connected),
            "disconnected" => Ok(ConnectionStatus::Disconnected),
            "error" => Ok(ConnectionStatus::Error),
            other => Err(format!("unknown connection status: {other}")),
        }
    }
}

/// OAuth/session material for one connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionCredentials {
    pub access_token: String,
    /// Per-account API root, e.g. the Mastodon instance URL. `None` means the
    /// platform default from config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

// Keep tokens out of logs.
impl fmt::Debug for ConnectionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCredentials")
            .field("access_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// A specific authenticated account on an external platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConnection {
    pub id: String,
    pub channel_type: ChannelType,
    pub status: ConnectionStatus,
    pub credentials: ConnectionCredentials,
}

impl ChannelConnection {
    pub fn is_usable(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// One attachment of a post variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub kind: MediaKind,
    /// Platform media id once the asset has been uploaded to the destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

/// Channel-tailored content of a post, as stored by the variant store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantContent {
    pub variant_id: String,
    pub text: String,
    #[serde(default)]
    pub media: Vec<MediaItem>,
}

impl VariantContent {
    pub fn count_media(&self, kind: MediaKind) -> usize {
        self.media.iter().filter(|m| m.kind == kind).count()
    }
}

/// Platform constraints checked before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLimits {
    /// Maximum text length in Unicode scalar values.
    pub max_text_length: usize,
    pub max_images: usize,
    pub max_videos: usize,
    /// Maximum attachments of any kind.
    pub max_media: usize,
}

impl ChannelLimits {
    /// Built-in limits for a platform, used when config does not override them.
    pub fn defaults_for(channel: ChannelType) -> Self {
        match channel {
            ChannelType::X => Self {
                max_text_length: 280,
                max_images: 4,
                max_videos: 1,
                max_media: 4,
            },
            ChannelType::Mastodon => Self {
                max_text_length: 500,
                max_images: 4,
                max_videos: 1,
                max_media: 4,
            },
        }
    }
}
