// src/lib.rs

//! Watchbot Library
//!
//! Polls classifieds listing pages, keeps entries matching a keyword list,
//! forwards each unseen entry to a Telegram chat, and remembers what was
//! sent in a persistent ledger.

pub mod delivery;
pub mod error;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
