//! Backing stores for the dedup ledger.
//!
//! A store holds one opaque document (the serialized ledger state) and must
//! replace it atomically: a reader observes either the previous complete
//! document or the new one, never a partial write.
//!
//! - [`LocalStore`]: a file on disk, written to `<name>.tmp` and renamed
//! - `S3Store` (feature `s3`): a single object, replaced by `PutObject`

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use local::LocalStore;
#[cfg(feature = "s3")]
pub use s3::S3Store;

/// Trait for ledger backing stores.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read the stored document, `None` if it does not exist.
    async fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the stored document atomically.
    async fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Remove the stored document. Missing documents are not an error.
    async fn delete(&self) -> Result<()>;

    /// Whether the document currently exists.
    async fn exists(&self) -> bool;

    /// Human-readable location for logs and stats.
    fn location(&self) -> String;
}
