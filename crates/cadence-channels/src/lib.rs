//! `cadence-channels`: per-platform publisher adapters.
//!
//! Every adapter implements [`Publisher`] and is registered in a
//! [`PublisherRegistry`] keyed by [`ChannelType`](cadence_core::ChannelType).
//! Adapters never return `Err`: transport and platform failures come back as
//! a classified [`PublishFailure`] so the execution coordinator can decide on
//! retries.

pub mod error;
mod http;
pub mod limits;
pub mod mastodon;
pub mod publisher;
pub mod registry;
pub mod types;
pub mod x;

pub use error::ChannelError;
pub use limits::check_limits;
pub use mastodon::MastodonPublisher;
pub use publisher::Publisher;
pub use registry::PublisherRegistry;
pub use types::{
    ErrorClass, FailureCode, PublishFailure, PublishRequest, PublishResult, PublishSuccess,
};
pub use x::XPublisher;
