//! `cadence-core`: types and configuration shared by every Cadence crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::CadenceConfig;
pub use error::{CadenceError, Result};
pub use types::{
    ChannelConnection, ChannelLimits, ChannelType, ConnectionCredentials, ConnectionStatus,
    MediaItem, MediaKind, VariantContent,
};
