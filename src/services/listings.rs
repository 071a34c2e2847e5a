// src/services/listings.rs

//! Classifieds listing scraper.
//!
//! Reads a listing page, keeps entries whose title matches a keyword, then
//! visits each entry's detail page to find its Telegram chat link.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Item, ListingSelectors, SourceConfig};
use crate::services::ListingSource;
use crate::utils::http::{create_async_client, fetch_text};
use crate::utils::{normalize_whitespace, resolve_url};

const NO_PRICE: &str = "N/A";

/// Scraper for yarmarka-style listing pages.
pub struct ClassifiedsScraper {
    client: Client,
    base_url: Url,
    keywords: Vec<String>,
    selectors: ListingSelectors,
    id_pattern: Regex,
    price_pattern: Regex,
}

impl ClassifiedsScraper {
    /// Build a scraper, validating selectors and patterns up front.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let selectors = config.selectors.clone();
        Self::parse_selector(&selectors.name_selector)?;
        Self::parse_selector(&selectors.price_selector)?;

        Ok(Self {
            client: create_async_client(config)?,
            base_url: Url::parse(&config.base_url)?,
            keywords: config.keywords.iter().map(|k| k.to_lowercase()).collect(),
            id_pattern: Self::parse_pattern(&selectors.id_pattern)?,
            price_pattern: Self::parse_pattern(&selectors.price_pattern)?,
            selectors,
        })
    }

    fn matches_keywords(&self, title: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let title = title.to_lowercase();
        self.keywords.iter().any(|k| title.contains(k.as_str()))
    }

    /// Last capture group of the id pattern applied to the listing href.
    fn extract_id(&self, href: &str) -> Option<String> {
        let caps = self.id_pattern.captures(href)?;
        caps.iter()
            .skip(1)
            .flatten()
            .last()
            .map(|m| m.as_str().to_string())
    }

    /// Parse matching items out of a listing page.
    fn parse_listings(&self, html: &str) -> Result<Vec<Item>> {
        let document = Html::parse_document(html);
        let name_sel = Self::parse_selector(&self.selectors.name_selector)?;
        let price_sel = Self::parse_selector(&self.selectors.price_selector)?;
        let link_sel = Self::parse_selector("a[href]")?;

        let mut items = Vec::new();
        for name_block in document.select(&name_sel) {
            if let Some(item) = self.parse_entry(name_block, &link_sel, &price_sel) {
                items.push(item);
            }
        }
        Ok(items)
    }

    fn parse_entry(
        &self,
        name_block: ElementRef,
        link_sel: &Selector,
        price_sel: &Selector,
    ) -> Option<Item> {
        let link = name_block.select(link_sel).next()?;
        let href = link.value().attr("href")?;
        let id = self.extract_id(href)?;

        let title = normalize_whitespace(&link.text().collect::<String>());
        if title.is_empty() || !self.matches_keywords(&title) {
            return None;
        }

        let price = self.find_price(name_block, price_sel);
        Some(Item::new(id, title, price, resolve_url(&self.base_url, href)))
    }

    /// Walk up from the name block to the nearest ancestor holding a price.
    fn find_price(&self, name_block: ElementRef, price_sel: &Selector) -> String {
        for ancestor in name_block.ancestors().filter_map(ElementRef::wrap) {
            if ancestor.value().name() == "body" {
                break;
            }
            if let Some(price_elem) = ancestor.select(price_sel).next() {
                let text: String = price_elem.text().collect();
                return self
                    .price_pattern
                    .captures(&text)
                    .and_then(|caps| caps.get(1))
                    .map(|amount| format!("{} {}", amount.as_str(), self.selectors.currency))
                    .unwrap_or_else(|| NO_PRICE.to_string());
            }
        }
        NO_PRICE.to_string()
    }

    /// Find the chat deep link on a detail page.
    ///
    /// Prefers the anchor labelled with the chat button text; otherwise takes
    /// the first per-listing chat link that is not the channel root.
    fn find_chat_link(&self, html: &str) -> Result<Option<String>> {
        let document = Html::parse_document(html);
        let anchor_sel = Self::parse_selector("a[href]")?;
        let rules = &self.selectors;

        let anchors: Vec<(String, &str)> = document
            .select(&anchor_sel)
            .filter_map(|a| {
                let href = a.value().attr("href")?;
                href.starts_with(&rules.chat_link_prefix)
                    .then(|| (a.text().collect::<String>(), href))
            })
            .collect();

        let labelled = anchors
            .iter()
            .find(|(text, _)| text.contains(&rules.chat_link_text));
        let link = labelled.or_else(|| {
            anchors.iter().find(|(_, href)| {
                href.contains(&rules.chat_link_marker) && *href != rules.chat_link_exclude
            })
        });

        Ok(link.map(|(_, href)| href.to_string()))
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }

    fn parse_pattern(s: &str) -> Result<Regex> {
        Regex::new(s).map_err(|e| AppError::selector(s, e))
    }
}

#[async_trait]
impl ListingSource for ClassifiedsScraper {
    async fn fetch(&self, endpoint: &str) -> Result<Vec<Item>> {
        log::info!("Fetching listings from {}", endpoint);
        let html = fetch_text(&self.client, endpoint)
            .await
            .map_err(|e| AppError::source_unavailable(endpoint, e))?;
        self.parse_listings(&html)
    }

    async fn enrich_with_secondary_link(&self, item: Item) -> Item {
        let link = match fetch_text(&self.client, item.primary_link()).await {
            Ok(html) => self.find_chat_link(&html).unwrap_or_else(|e| {
                log::warn!("Chat link lookup failed for {}: {}", item.id(), e);
                None
            }),
            Err(e) => {
                log::warn!("Failed to fetch detail page {}: {}", item.primary_link(), e);
                None
            }
        };

        if link.is_none() {
            log::warn!("No chat link found for item {}: {}", item.id(), item.title());
        }
        item.with_secondary_link(link)
    }
}
