// src/models/mod.rs

//! Domain models for the watcher.

mod config;
mod item;

pub use config::{
    CommitPolicy, Config, DeliveryConfig, LedgerConfig, ListingSelectors, ScheduleConfig,
    SourceConfig, TelegramConfig,
};
pub use item::Item;
