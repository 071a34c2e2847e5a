//! Scripted fakes for the collaborator traits, shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::Item;
use crate::notify::{ChannelError, NotifierChannel, OutboundMessage};
use crate::services::ListingSource;
use crate::storage::LedgerStore;

/// Build a notifiable item with predictable display fields.
pub fn item(id: &str) -> Item {
    Item::new(
        id,
        format!("Журнальный столик {id}"),
        "40 GEL",
        format!("https://yarmarka.ge/g_zhurnalnystol_{id}"),
    )
    .with_secondary_link(Some(format!("https://t.me/baraholka_tbilisi/{id}")))
}

#[derive(Default)]
struct MemoryState {
    document: Option<Vec<u8>>,
    writes: usize,
    fail_writes: bool,
}

/// In-memory ledger store that counts writes and can be told to fail.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(bytes: &[u8]) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().document = Some(bytes.to_vec());
        store
    }

    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    pub fn document(&self) -> Option<Vec<u8>> {
        self.state.lock().unwrap().document.clone()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.document())
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(AppError::Io(std::io::Error::other("disk full")));
        }
        state.document = Some(bytes.to_vec());
        state.writes += 1;
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        self.state.lock().unwrap().document = None;
        Ok(())
    }

    async fn exists(&self) -> bool {
        self.state.lock().unwrap().document.is_some()
    }

    fn location(&self) -> String {
        "memory://ledger".to_string()
    }
}

#[derive(Default)]
struct ChannelState {
    script: VecDeque<std::result::Result<(), ChannelError>>,
    sent: Vec<OutboundMessage>,
    probe_ok: bool,
}

/// Notifier channel that answers from a script and records every call.
///
/// Once the script is exhausted every delivery succeeds.
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        let channel = Self::default();
        channel.state.lock().unwrap().probe_ok = true;
        channel
    }

    pub fn with_script(
        script: impl IntoIterator<Item = std::result::Result<(), ChannelError>>,
    ) -> Self {
        let channel = Self::new();
        channel.state.lock().unwrap().script = script.into_iter().collect();
        channel
    }

    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl NotifierChannel for ScriptedChannel {
    async fn deliver(&self, message: &OutboundMessage) -> std::result::Result<(), ChannelError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(message.clone());
        state.script.pop_front().unwrap_or(Ok(()))
    }

    async fn identity_probe(&self) -> std::result::Result<String, ChannelError> {
        if self.state.lock().unwrap().probe_ok {
            Ok("scripted_bot".to_string())
        } else {
            Err(ChannelError::Fatal("401 Unauthorized".to_string()))
        }
    }
}

/// Listing source serving fixed results per endpoint.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    pages: Arc<HashMap<String, std::result::Result<Vec<Item>, String>>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSource {
    pub fn new(
        pages: impl IntoIterator<Item = (&'static str, std::result::Result<Vec<Item>, String>)>,
    ) -> Self {
        Self {
            pages: Arc::new(
                pages
                    .into_iter()
                    .map(|(endpoint, page)| (endpoint.to_string(), page))
                    .collect(),
            ),
            fetched: Arc::default(),
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingSource for ScriptedSource {
    async fn fetch(&self, endpoint: &str) -> Result<Vec<Item>> {
        self.fetched.lock().unwrap().push(endpoint.to_string());
        match self.pages.get(endpoint) {
            Some(Ok(items)) => Ok(items.clone()),
            Some(Err(message)) => Err(AppError::source_unavailable(endpoint, message)),
            None => Ok(Vec::new()),
        }
    }

    async fn enrich_with_secondary_link(&self, item: Item) -> Item {
        item
    }
}
