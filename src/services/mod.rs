//! Listing sources.
//!
//! A source turns one endpoint (a listing page URL) into candidate items and
//! can look up each item's chat deep link on its detail page.
//!
//! - [`ClassifiedsScraper`]: HTML scraper for yarmarka.ge listing pages

mod listings;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Item;

pub use listings::ClassifiedsScraper;

/// Trait for listing sources.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Read one endpoint and return the items matching the configured filter.
    async fn fetch(&self, endpoint: &str) -> Result<Vec<Item>>;

    /// Attach the chat deep link, or return the item without one.
    async fn enrich_with_secondary_link(&self, item: Item) -> Item;

    /// Fetch an endpoint and keep only items that carry a chat link.
    async fn scrape(&self, endpoint: &str) -> Result<Vec<Item>> {
        let items = self.fetch(endpoint).await?;
        let found = items.len();

        let mut notifiable = Vec::with_capacity(found);
        for item in items {
            let item = self.enrich_with_secondary_link(item).await;
            if item.is_notifiable() {
                notifiable.push(item);
            } else {
                log::debug!("Skipping item {} without chat link", item.id());
            }
        }

        log::info!(
            "{}: {} matching items, {} with chat link",
            endpoint,
            found,
            notifiable.len()
        );
        Ok(notifiable)
    }
}
