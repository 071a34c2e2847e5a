//! Listing item data structure.

use serde::{Deserialize, Serialize};

/// A single scraped listing that may become a notification.
///
/// Display fields are fixed at construction; only the chat link can be
/// attached afterwards, producing a new value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    id: String,
    title: String,
    price: String,
    primary_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secondary_link: Option<String>,
}

impl Item {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        price: impl Into<String>,
        primary_link: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            price: price.into(),
            primary_link: primary_link.into(),
            secondary_link: None,
        }
    }

    /// Attach (or clear) the chat deep link.
    pub fn with_secondary_link(mut self, link: Option<String>) -> Self {
        self.secondary_link = link;
        self
    }

    /// Site-assigned identifier, the dedup key.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn price(&self) -> &str {
        &self.price
    }

    pub fn primary_link(&self) -> &str {
        &self.primary_link
    }

    pub fn secondary_link(&self) -> Option<&str> {
        self.secondary_link.as_deref()
    }

    /// Items without a chat link are never notified.
    pub fn is_notifiable(&self) -> bool {
        self.secondary_link.is_some()
    }
}
