//! Core Storage Traits
//!
//! `ObjectStorage` is the seam between database handles and a storage
//! engine. Handles add transactions, queries and statistics on top; an
//! engine only stores versioned documents in per-class clusters.

use async_trait::async_trait;

use crate::document::Document;
use crate::error::OrmResult;
use crate::identity::RecordId;

/// One staged write applied by `ObjectStorage::apply`
#[derive(Debug, Clone, PartialEq)]
pub enum TxOperation {
    /// Create or update. `base_version` 0 means the record must not exist yet.
    Save { document: Document, base_version: i32 },
    /// Remove a record that must still be at `base_version`
    Delete { rid: RecordId, base_version: i32 },
}

/// Storage engine abstraction
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Storage name, usually the database name from the URL
    fn name(&self) -> &str;

    /// Reserve the next identity in the class's cluster without writing
    async fn allocate(&self, class_name: &str) -> OrmResult<RecordId>;

    /// Load a record. Fails with `RecordNotFound` when absent.
    async fn load(&self, rid: RecordId) -> OrmResult<Document>;

    /// Insert or update a record and return it with its new identity and
    /// version. A non-zero version on update must match the stored one.
    async fn save(&self, document: Document) -> OrmResult<Document>;

    /// Delete a record. A non-zero version must match the stored one.
    async fn delete(&self, rid: RecordId, version: i32) -> OrmResult<()>;

    /// Every record of a class, in identity order
    async fn browse_class(&self, class_name: &str) -> OrmResult<Vec<Document>>;

    /// Number of records of a class
    async fn count_class(&self, class_name: &str) -> OrmResult<u64>;

    /// Apply all operations or none of them
    async fn apply(&self, operations: Vec<TxOperation>) -> OrmResult<Vec<Document>>;

    /// Names of every class that owns a cluster
    async fn classes(&self) -> OrmResult<Vec<String>>;

    /// Drop reservations made by `allocate` for identities that will not
    /// be written. Their positions are not handed out again.
    fn release(&self, rids: &[RecordId]);

    /// Release the storage. Later calls fail.
    async fn close(&self) -> OrmResult<()>;
}
