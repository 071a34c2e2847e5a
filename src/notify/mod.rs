// src/notify/mod.rs

//! Outbound notification channel.
//!
//! A channel takes a rendered [`OutboundMessage`] and reports the outcome of
//! a single attempt as a [`ChannelError`] classification. Pacing and retries
//! live in [`crate::delivery`], not here.

pub mod format;
pub mod telegram;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use format::{escape_markdown, plain_message, rich_message};
pub use telegram::TelegramChannel;

/// Link button attached below a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub label: String,
    pub url: String,
}

/// A message ready to hand to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub actions: Vec<Action>,
    /// Text carries MarkdownV2 markup
    pub rich: bool,
}

/// Classified result of one failed channel call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Channel asked us to back off
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// Transient transport failure (timeout, connection, 5xx)
    #[error("transient failure: {0}")]
    Timeout(String),

    /// Message refused as malformed; may succeed with another rendering
    #[error("message rejected: {0}")]
    Rejected(String),

    /// Destination unreachable for good (bad token, chat gone)
    #[error("permanent failure: {0}")]
    Fatal(String),

    #[error("unexpected response: {0}")]
    Unknown(String),
}

/// Trait for notification channels.
#[async_trait]
pub trait NotifierChannel: Send + Sync {
    /// Make exactly one delivery attempt.
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), ChannelError>;

    /// Check credentials and reachability, returning the sender's identity.
    async fn identity_probe(&self) -> Result<String, ChannelError>;
}
