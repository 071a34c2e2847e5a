//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Bot credentials and API endpoint
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Listing pages and scraping rules
    #[serde(default)]
    pub source: SourceConfig,

    /// Pacing and retry behavior for outgoing messages
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Dedup ledger location and retention
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Scheduler settings
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using the given variable lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(chat_id) = lookup("CHAT_ID") {
            self.telegram.chat_id = chat_id;
        }
        if let Some(urls) = lookup("YARMARKA_URLS") {
            self.source.urls = urls
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(minutes) = lookup("CHECK_INTERVAL_MINUTES") {
            match minutes.trim().parse() {
                Ok(minutes) => self.schedule.interval_minutes = minutes,
                Err(_) => log::warn!("Ignoring invalid CHECK_INTERVAL_MINUTES: {}", minutes),
            }
        }
        if let Some(path) = lookup("STATE_FILE") {
            self.ledger.path = path;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() || self.telegram.chat_id.trim().is_empty() {
            return Err(AppError::config(
                "BOT_TOKEN and CHAT_ID must be set (environment or [telegram] section)",
            ));
        }
        if self.source.urls.is_empty() {
            return Err(AppError::config("No listing URLs configured"));
        }
        if self.source.user_agent.trim().is_empty() {
            return Err(AppError::config("source.user_agent is empty"));
        }
        if self.source.timeout_secs == 0 || self.telegram.timeout_secs == 0 {
            return Err(AppError::config("HTTP timeouts must be > 0"));
        }
        if self.schedule.interval_minutes == 0 {
            return Err(AppError::config("schedule.interval_minutes must be > 0"));
        }
        if self.schedule.period().is_none() {
            return Err(AppError::config(format!(
                "schedule.interval_minutes must be at most {}",
                MAX_INTERVAL_MINUTES
            )));
        }
        if self.ledger.retention_days == 0 {
            return Err(AppError::config("ledger.retention_days must be > 0"));
        }
        if self.ledger.path.trim().is_empty() {
            return Err(AppError::config("ledger.path is empty"));
        }
        Ok(())
    }
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,

    /// Target chat (numeric id or `@channel`)
    #[serde(default)]
    pub chat_id: String,

    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: defaults::api_base(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Listing pages and keyword filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Site root used to resolve listing links
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Listing pages polled each cycle, in order
    #[serde(default = "defaults::urls")]
    pub urls: Vec<String>,

    /// Case-insensitive title keywords; empty matches everything
    #[serde(default = "defaults::keywords")]
    pub keywords: Vec<String>,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub selectors: ListingSelectors,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            urls: defaults::urls(),
            keywords: defaults::keywords(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            selectors: ListingSelectors::default(),
        }
    }
}

/// Selectors and patterns for the listing and detail pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// Block holding the listing name link
    #[serde(default = "defaults::name_selector")]
    pub name_selector: String,

    /// Price block, searched among the name block's ancestors
    #[serde(default = "defaults::price_selector")]
    pub price_selector: String,

    /// Regex over the listing href; the last capture group is the id
    #[serde(default = "defaults::id_pattern")]
    pub id_pattern: String,

    /// Regex over the price text; the first capture group is the amount
    #[serde(default = "defaults::price_pattern")]
    pub price_pattern: String,

    #[serde(default = "defaults::currency")]
    pub currency: String,

    /// Button text of the chat link on the detail page
    #[serde(default = "defaults::chat_link_text")]
    pub chat_link_text: String,

    #[serde(default = "defaults::chat_link_prefix")]
    pub chat_link_prefix: String,

    /// Substring identifying a per-listing chat link
    #[serde(default = "defaults::chat_link_marker")]
    pub chat_link_marker: String,

    /// Channel root link that never identifies a listing
    #[serde(default = "defaults::chat_link_exclude")]
    pub chat_link_exclude: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            name_selector: defaults::name_selector(),
            price_selector: defaults::price_selector(),
            id_pattern: defaults::id_pattern(),
            price_pattern: defaults::price_pattern(),
            currency: defaults::currency(),
            chat_link_text: defaults::chat_link_text(),
            chat_link_prefix: defaults::chat_link_prefix(),
            chat_link_marker: defaults::chat_link_marker(),
            chat_link_exclude: defaults::chat_link_exclude(),
        }
    }
}

/// Outgoing message pacing and retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Minimum spacing between channel calls
    #[serde(default = "defaults::min_interval_ms")]
    pub min_interval_ms: u64,

    /// Pause between items of a batch
    #[serde(default = "defaults::item_pause_ms")]
    pub item_pause_ms: u64,

    /// Retries shared by rate-limit and transient errors
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Added to the channel's requested cooldown
    #[serde(default = "defaults::rate_limit_margin_secs")]
    pub rate_limit_margin_secs: u64,

    /// Retry k waits `base^k + 1` seconds
    #[serde(default = "defaults::backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Progress line every N items
    #[serde(default = "defaults::progress_every")]
    pub progress_every: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: defaults::min_interval_ms(),
            item_pause_ms: defaults::item_pause_ms(),
            max_retries: defaults::max_retries(),
            rate_limit_margin_secs: defaults::rate_limit_margin_secs(),
            backoff_base_secs: defaults::backoff_base_secs(),
            progress_every: defaults::progress_every(),
        }
    }
}

/// Which delivered items are recorded after a batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Only the leading run of successes
    #[default]
    Prefix,
    /// Every successful delivery
    AllSuccessful,
}

/// Dedup ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// State file path (local backing store)
    #[serde(default = "defaults::ledger_path")]
    pub path: String,

    #[serde(default = "defaults::retention_days")]
    pub retention_days: u32,

    #[serde(default)]
    pub commit_policy: CommitPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: defaults::ledger_path(),
            retention_days: defaults::retention_days(),
            commit_policy: CommitPolicy::default(),
        }
    }
}

/// Longest accepted check interval (one week).
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "defaults::interval_minutes")]
    pub interval_minutes: u64,
}

impl ScheduleConfig {
    /// The interval as a duration, `None` when zero or above the maximum.
    pub fn period(&self) -> Option<Duration> {
        if self.interval_minutes == 0 || self.interval_minutes > MAX_INTERVAL_MINUTES {
            return None;
        }
        self.interval_minutes.checked_mul(60).map(Duration::from_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: defaults::interval_minutes(),
        }
    }
}

mod defaults {
    // Telegram defaults
    pub fn api_base() -> String {
        "https://api.telegram.org".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Source defaults
    pub fn base_url() -> String {
        "https://yarmarka.ge".into()
    }
    pub fn urls() -> Vec<String> {
        vec!["https://yarmarka.ge/goods/c_2438/0/0?sort=new".into()]
    }
    pub fn keywords() -> Vec<String> {
        ["стеллаж", "стелаж", "журнальный", "столик", "зеркало"]
            .into_iter()
            .map(String::from)
            .collect()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".into()
    }

    // Selector defaults
    pub fn name_selector() -> String {
        "div.product-list__name".into()
    }
    pub fn price_selector() -> String {
        "div.product-list__price".into()
    }
    pub fn id_pattern() -> String {
        r"/g_(.+)_(\d+)$".into()
    }
    pub fn price_pattern() -> String {
        r"(\d+(?:\.\d+)?)\s*GEL".into()
    }
    pub fn currency() -> String {
        "GEL".into()
    }
    pub fn chat_link_text() -> String {
        "Посмотреть в чате".into()
    }
    pub fn chat_link_prefix() -> String {
        "https://t.me/".into()
    }
    pub fn chat_link_marker() -> String {
        "/baraholka_".into()
    }
    pub fn chat_link_exclude() -> String {
        "https://t.me/baraholka_ge".into()
    }

    // Delivery defaults
    pub fn min_interval_ms() -> u64 {
        1_500
    }
    pub fn item_pause_ms() -> u64 {
        500
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn rate_limit_margin_secs() -> u64 {
        1
    }
    pub fn backoff_base_secs() -> u64 {
        2
    }
    pub fn progress_every() -> usize {
        5
    }

    // Ledger defaults
    pub fn ledger_path() -> String {
        "sent_ads.json".into()
    }
    pub fn retention_days() -> u32 {
        7
    }

    // Schedule defaults
    pub fn interval_minutes() -> u64 {
        30
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn with_credentials() -> Config {
        let mut config = Config::default();
        config.telegram.bot_token = "123:abc".to_string();
        config.telegram.chat_id = "-100200".to_string();
        config
    }

    #[test]
    fn validate_requires_credentials() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(with_credentials().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = with_credentials();
        config.schedule.interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_interval() {
        let mut config = with_credentials();
        config.schedule.interval_minutes = u64::MAX;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
        assert!(config.schedule.period().is_none());

        config.schedule.interval_minutes = MAX_INTERVAL_MINUTES;
        assert!(config.validate().is_ok());
        assert_eq!(
            config.schedule.period(),
            Some(Duration::from_secs(MAX_INTERVAL_MINUTES * 60))
        );
    }

    #[test]
    fn validate_rejects_empty_urls() {
        let mut config = with_credentials();
        config.source.urls.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_split_urls_and_drop_blanks() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BOT_TOKEN", "t"),
            ("CHAT_ID", "c"),
            ("YARMARKA_URLS", " https://a/1 , ,https://b/2,"),
            ("CHECK_INTERVAL_MINUTES", "15"),
            ("STATE_FILE", "/tmp/state.json"),
        ]);
        let mut config = Config::default();
        config.apply_env_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.telegram.bot_token, "t");
        assert_eq!(config.telegram.chat_id, "c");
        assert_eq!(config.source.urls, vec!["https://a/1", "https://b/2"]);
        assert_eq!(config.schedule.interval_minutes, 15);
        assert_eq!(config.ledger.path, "/tmp/state.json");
    }

    #[test]
    fn invalid_interval_keeps_default() {
        let mut config = Config::default();
        config.apply_env_from(|key| (key == "CHECK_INTERVAL_MINUTES").then(|| "soon".to_string()));
        assert_eq!(config.schedule.interval_minutes, 30);
    }

    #[test]
    fn partial_toml_uses_field_defaults() {
        let config: Config = toml::from_str(
            r#"
            [telegram]
            bot_token = "x"
            chat_id = "y"

            [ledger]
            commit_policy = "all_successful"
            "#,
        )
        .unwrap();

        assert_eq!(config.delivery.min_interval_ms, 1_500);
        assert_eq!(config.delivery.max_retries, 3);
        assert_eq!(config.ledger.retention_days, 7);
        assert_eq!(config.ledger.commit_policy, CommitPolicy::AllSuccessful);
        assert_eq!(config.source.keywords.len(), 5);
        assert!(config.validate().is_ok());
    }
}
