//! Transaction Management
//!
//! Optimistic transactions on a `DatabaseHandle`. Writes are staged on the
//! handle and applied atomically by `commit`, which re-checks every record
//! version against storage. Reads through the handle see staged state.

use std::collections::HashMap;
use std::future::Future;

use tracing::{debug, warn};

use crate::backends::{ObjectStorage, TxOperation};
use crate::database::DatabaseHandle;
use crate::document::Document;
use crate::error::{ModelError, ModelResult};
use crate::identity::RecordId;

/// Transaction configuration options
#[derive(Debug, Clone)]
pub struct TransactionConfig {
    /// Retry the whole closure when commit hits a concurrent modification
    pub auto_retry: bool,
    /// Maximum number of retry attempts
    pub max_retries: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            auto_retry: false,
            max_retries: 3,
        }
    }
}

impl TransactionConfig {
    /// Configuration that retries on version conflicts
    pub fn retrying(max_retries: u32) -> Self {
        Self {
            auto_retry: true,
            max_retries,
        }
    }
}

#[derive(Debug, Clone)]
struct Staged {
    /// `None` marks a staged deletion
    document: Option<Document>,
    /// Version the record had in storage when first touched; 0 if new
    base_version: i32,
}

/// Writes staged on a handle between `begin` and `commit`
#[derive(Debug, Default)]
pub(crate) struct TxState {
    staged: HashMap<RecordId, Staged>,
    order: Vec<RecordId>,
    /// Identities allocated by this transaction
    reserved: Vec<RecordId>,
}

impl TxState {
    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn reserved(&self) -> &[RecordId] {
        &self.reserved
    }

    /// `Some(None)` when the record is staged for deletion
    pub(crate) fn get(&self, rid: RecordId) -> Option<Option<Document>> {
        self.staged.get(&rid).map(|staged| staged.document.clone())
    }

    fn insert(&mut self, rid: RecordId, staged: Staged) {
        if self.staged.insert(rid, staged).is_none() {
            self.order.push(rid);
        }
    }

    fn remove(&mut self, rid: RecordId) {
        if self.staged.remove(&rid).is_some() {
            self.order.retain(|staged| *staged != rid);
        }
    }

    /// Version currently stored for `rid`, if the record exists
    async fn stored_version(storage: &dyn ObjectStorage, rid: RecordId) -> ModelResult<Option<i32>> {
        match storage.load(rid).await {
            Ok(document) => Ok(Some(document.version())),
            Err(ModelError::RecordNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub(crate) async fn stage_save(
        &mut self,
        storage: &dyn ObjectStorage,
        mut document: Document,
    ) -> ModelResult<Document> {
        let rid = match document.rid() {
            Some(rid) if rid.is_persistent() => rid,
            _ => {
                let rid = storage.allocate(document.class_name()).await?;
                self.reserved.push(rid);
                document.set_rid(rid);
                document.set_version(1);
                self.insert(
                    rid,
                    Staged {
                        document: Some(document.clone()),
                        base_version: 0,
                    },
                );
                return Ok(document);
            }
        };

        let expected = document.version();
        let (current, base_version) = match self.staged.get(&rid) {
            Some(Staged { document: None, .. }) => return Err(ModelError::RecordNotFound(rid)),
            Some(Staged {
                document: Some(staged),
                base_version,
            }) => (staged.version(), *base_version),
            None => match Self::stored_version(storage, rid).await? {
                Some(version) => (version, version),
                // Created and then deleted in this transaction
                None if self.reserved.contains(&rid) => (0, 0),
                None => return Err(ModelError::RecordNotFound(rid)),
            },
        };

        if expected != 0 && current != 0 && expected != current {
            return Err(ModelError::ConcurrentModification {
                rid,
                expected,
                actual: current,
            });
        }

        document.set_version(current + 1);
        self.insert(
            rid,
            Staged {
                document: Some(document.clone()),
                base_version,
            },
        );
        Ok(document)
    }

    pub(crate) async fn stage_delete(
        &mut self,
        storage: &dyn ObjectStorage,
        rid: RecordId,
        expected: i32,
    ) -> ModelResult<()> {
        let (current, base_version) = match self.staged.get(&rid) {
            Some(Staged { document: None, .. }) => return Err(ModelError::RecordNotFound(rid)),
            Some(Staged {
                document: Some(staged),
                base_version,
            }) => (staged.version(), *base_version),
            None => match Self::stored_version(storage, rid).await? {
                Some(version) => (version, version),
                None => return Err(ModelError::RecordNotFound(rid)),
            },
        };

        if expected != 0 && expected != current {
            return Err(ModelError::ConcurrentModification {
                rid,
                expected,
                actual: current,
            });
        }

        if base_version == 0 {
            // Created in this transaction; nothing reaches storage
            self.remove(rid);
        } else {
            self.insert(
                rid,
                Staged {
                    document: None,
                    base_version,
                },
            );
        }
        Ok(())
    }

    /// Merge staged writes into a class's stored records
    pub(crate) fn overlay(&self, class_name: &str, stored: Vec<Document>) -> Vec<Document> {
        let mut merged: Vec<Document> = stored
            .into_iter()
            .filter_map(|document| match document.rid() {
                Some(rid) => match self.staged.get(&rid) {
                    Some(staged) => staged.document.clone(),
                    None => Some(document),
                },
                None => Some(document),
            })
            .collect();

        for rid in &self.order {
            if let Some(Staged {
                document: Some(document),
                base_version: 0,
            }) = self.staged.get(rid)
            {
                if document.class_name().eq_ignore_ascii_case(class_name)
                    && !merged.iter().any(|existing| existing.rid() == Some(*rid))
                {
                    merged.push(document.clone());
                }
            }
        }

        merged.sort_by_key(|document| document.rid().unwrap_or(RecordId::NEW));
        merged
    }

    fn into_operations(mut self) -> Vec<TxOperation> {
        self.order
            .into_iter()
            .filter_map(|rid| self.staged.remove(&rid).map(|staged| (rid, staged)))
            .map(|(rid, staged)| match staged.document {
                Some(mut document) => {
                    document.set_version(staged.base_version);
                    TxOperation::Save {
                        document,
                        base_version: staged.base_version,
                    }
                }
                None => TxOperation::Delete {
                    rid,
                    base_version: staged.base_version,
                },
            })
            .collect()
    }
}

impl DatabaseHandle {
    /// Begin a transaction on this handle
    pub async fn begin(&self) -> ModelResult<()> {
        self.ensure_open()?;
        let mut tx = self.tx.lock().await;
        if tx.is_some() {
            return Err(ModelError::Transaction(
                "a transaction is already active on this handle".to_string(),
            ));
        }
        *tx = Some(TxState::default());
        debug!("Began transaction on handle {}", self.id());
        Ok(())
    }

    /// Whether a transaction is open
    pub async fn in_transaction(&self) -> bool {
        self.tx.lock().await.is_some()
    }

    /// Apply every staged write atomically. On failure nothing is written
    /// and the transaction is discarded.
    pub async fn commit(&self) -> ModelResult<()> {
        self.ensure_open()?;
        let state = self.tx.lock().await.take().ok_or_else(|| {
            ModelError::Transaction("no active transaction to commit".to_string())
        })?;

        let reserved = state.reserved().to_vec();
        if state.is_empty() {
            self.storage().release(&reserved);
            debug!("Committed empty transaction on handle {}", self.id());
            return Ok(());
        }

        let operations = state.into_operations();
        let count = operations.len();
        let result = self.storage().apply(operations).await.map(|_| ());
        // Written identities are no longer reserved; the rest never will be
        self.storage().release(&reserved);
        match &result {
            Ok(()) => debug!("Committed {} operations on handle {}", count, self.id()),
            Err(err) => warn!("Commit failed on handle {}, transaction discarded: {}", self.id(), err),
        }
        self.track(result)
    }

    /// Discard every staged write
    pub async fn rollback(&self) -> ModelResult<()> {
        self.ensure_open()?;
        let state = self.tx.lock().await.take().ok_or_else(|| {
            ModelError::Transaction("no active transaction to roll back".to_string())
        })?;
        self.storage().release(state.reserved());
        debug!(
            "Rolled back transaction on handle {} ({} staged writes)",
            self.id(),
            state.len()
        );
        Ok(())
    }

    /// Staged view of one record
    pub(crate) async fn staged(&self, rid: RecordId) -> Option<Option<Document>> {
        self.tx.lock().await.as_ref().and_then(|state| state.get(rid))
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`
    pub async fn transaction<'a, F, Fut, R>(&'a self, f: F) -> ModelResult<R>
    where
        F: FnOnce(&'a DatabaseHandle) -> Fut,
        Fut: Future<Output = ModelResult<R>> + 'a,
    {
        self.begin().await?;
        match f(self).await {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if self.in_transaction().await {
                    self.rollback().await?;
                }
                Err(err)
            }
        }
    }

    /// Like [`transaction`](Self::transaction), optionally re-running the
    /// closure when commit hits a concurrent modification
    pub async fn transaction_with<'a, F, Fut, R>(
        &'a self,
        config: TransactionConfig,
        f: F,
    ) -> ModelResult<R>
    where
        F: Fn(&'a DatabaseHandle) -> Fut,
        Fut: Future<Output = ModelResult<R>> + 'a,
    {
        let max_attempts = if config.auto_retry {
            config.max_retries + 1
        } else {
            1
        };
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!("Starting transaction attempt {} of {}", attempts, max_attempts);

            match self.transaction(&f).await {
                Err(err) if attempts < max_attempts && is_concurrency_failure(&err) => {
                    warn!("Concurrent modification on attempt {}, retrying: {}", attempts, err);
                }
                result => return result,
            }
        }
    }
}

/// Whether an error is a version conflict that a retry may resolve
pub fn is_concurrency_failure(error: &ModelError) -> bool {
    matches!(error, ModelError::ConcurrentModification { .. })
}
