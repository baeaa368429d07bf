//! Database factory and handles
//!
//! `Odb` owns the storage engine and hands out `DatabaseHandle`s, the
//! object-database transaction handles every model operation runs through.
//! Handles are cheap; open one per unit of work and let it drop (or call
//! `close`) when done.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use orient_core::{AppConfigTrait, ConfigError, DatabaseConfig, StorageEngine};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backends::{MemoryStorage, ObjectStorage};
use crate::document::Document;
use crate::error::{ModelError, ModelResult, PoolError};
use crate::identity::RecordId;
use crate::query::{self, QueryParams, SelectQuery};
use crate::transaction::TxState;

static GLOBAL_FACTORY: OnceCell<Odb> = OnceCell::new();

/// Factory statistics
#[derive(Debug, Clone)]
pub struct OdbStats {
    pub opened_handles: u64,
    pub open_handles: u32,
    pub closed_handles: u64,
    pub operations: u64,
    pub errors: u64,
    pub created_at: Instant,
}

impl OdbStats {
    pub fn error_rate(&self) -> f64 {
        if self.operations == 0 {
            0.0
        } else {
            self.errors as f64 / self.operations as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicU64,
    open: AtomicU32,
    closed: AtomicU64,
    operations: AtomicU64,
    errors: AtomicU64,
}

struct OdbInner {
    config: DatabaseConfig,
    storage: Arc<dyn ObjectStorage>,
    counters: Counters,
    closed: AtomicBool,
    created_at: Instant,
}

/// Object database factory
#[derive(Clone)]
pub struct Odb {
    inner: Arc<OdbInner>,
}

impl std::fmt::Debug for Odb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Odb")
            .field("url", &self.inner.config.url.to_string())
            .field("storage", &self.inner.storage.name())
            .field("open_handles", &self.inner.counters.open.load(Ordering::Relaxed))
            .finish()
    }
}

impl Odb {
    /// Build a factory for the configured URL. Only `memory:` storage is
    /// served in-process.
    pub fn new(config: DatabaseConfig) -> ModelResult<Self> {
        config.validate()?;

        let storage: Arc<dyn ObjectStorage> = match config.url.engine {
            StorageEngine::Memory => Arc::new(MemoryStorage::new(config.url.database_name())),
            other => {
                return Err(ConfigError::UnsupportedStorage {
                    engine: other.scheme().to_string(),
                    supported: StorageEngine::Memory.scheme().to_string(),
                }
                .into())
            }
        };

        Ok(Self::with_storage(config, storage))
    }

    /// Factory over an in-memory database
    pub fn memory(name: &str) -> Self {
        let config = DatabaseConfig::memory(name);
        let storage = Arc::new(MemoryStorage::new(name));
        Self::with_storage(config, storage)
    }

    /// Factory configured from `ORIENTDB_*` environment variables
    pub fn from_env() -> ModelResult<Self> {
        Self::new(DatabaseConfig::from_env()?)
    }

    /// Factory over a caller-provided storage engine
    pub fn with_storage(config: DatabaseConfig, storage: Arc<dyn ObjectStorage>) -> Self {
        debug!("Database factory created for {} (max {} handles)", config.url, config.max_handles);
        Self {
            inner: Arc::new(OdbInner {
                config,
                storage,
                counters: Counters::default(),
                closed: AtomicBool::new(false),
                created_at: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    /// Open a new handle
    pub fn open(&self) -> ModelResult<DatabaseHandle> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::FactoryClosed.into());
        }

        let max_handles = self.inner.config.max_handles;
        let counters = &self.inner.counters;
        let reserved = counters
            .open
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < max_handles).then_some(open + 1)
            });
        if reserved.is_err() {
            warn!("Database handle limit reached: {}/{} handles in use", max_handles, max_handles);
            return Err(PoolError::PoolExhausted { max_handles }.into());
        }

        let id = counters.opened.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Opened database handle {} on {}", id, self.inner.config.url);

        Ok(DatabaseHandle {
            id,
            factory: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
            tx: Mutex::new(None),
        })
    }

    pub fn stats(&self) -> OdbStats {
        let counters = &self.inner.counters;
        OdbStats {
            opened_handles: counters.opened.load(Ordering::Relaxed),
            open_handles: counters.open.load(Ordering::Relaxed),
            closed_handles: counters.closed.load(Ordering::Relaxed),
            operations: counters.operations.load(Ordering::Relaxed),
            errors: counters.errors.load(Ordering::Relaxed),
            created_at: self.inner.created_at,
        }
    }

    /// Refuse new handles and release the storage
    pub async fn close(&self) -> ModelResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let open = self.inner.counters.open.load(Ordering::Relaxed);
        if open > 0 {
            warn!("Closing database factory with {} handles still open", open);
        }
        self.inner.storage.close().await
    }

    /// Install the process-wide factory used by [`db`]
    pub fn install_global(self) -> Result<&'static Odb, PoolError> {
        GLOBAL_FACTORY
            .set(self)
            .map_err(|_| PoolError::AlreadyInstalled)?;
        GLOBAL_FACTORY.get().ok_or(PoolError::NoDefaultFactory)
    }

    /// The process-wide factory, if installed
    pub fn global() -> Result<&'static Odb, PoolError> {
        GLOBAL_FACTORY.get().ok_or(PoolError::NoDefaultFactory)
    }
}

/// Open a handle on the process-wide factory.
///
/// Each call opens a new handle; keep one around for a sequence of
/// operations rather than calling this per operation.
pub fn db() -> ModelResult<DatabaseHandle> {
    Odb::global()?.open()
}

/// Object database transaction handle
pub struct DatabaseHandle {
    id: u64,
    factory: Arc<OdbInner>,
    closed: AtomicBool,
    pub(crate) tx: Mutex<Option<TxState>>,
}

impl std::fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("id", &self.id)
            .field("storage", &self.factory.storage.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl DatabaseHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn storage(&self) -> &dyn ObjectStorage {
        self.factory.storage.as_ref()
    }

    pub(crate) fn ensure_open(&self) -> ModelResult<()> {
        if self.is_closed() {
            return Err(ModelError::DatabaseClosed);
        }
        Ok(())
    }

    /// Count the operation and its failure, if any
    pub(crate) fn track<T>(&self, result: ModelResult<T>) -> ModelResult<T> {
        let counters = &self.factory.counters;
        counters.operations.fetch_add(1, Ordering::Relaxed);
        if result.is_err() {
            counters.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Load a record, seeing writes staged in the open transaction
    pub async fn load(&self, rid: RecordId) -> ModelResult<Document> {
        self.ensure_open()?;
        let result = match self.staged(rid).await {
            Some(Some(document)) => Ok(document),
            Some(None) => Err(ModelError::RecordNotFound(rid)),
            None => self.storage().load(rid).await,
        };
        self.track(result)
    }

    /// Load a record straight from storage, ignoring staged writes
    pub async fn reload(&self, rid: RecordId) -> ModelResult<Document> {
        self.ensure_open()?;
        let result = self.storage().load(rid).await;
        self.track(result)
    }

    /// Whether a record exists from this handle's point of view
    pub async fn exists(&self, rid: RecordId) -> ModelResult<bool> {
        match self.load(rid).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Whether the handle tracks a live record with this identity
    pub async fn is_managed(&self, rid: Option<RecordId>) -> ModelResult<bool> {
        match rid {
            Some(rid) if rid.is_persistent() => self.exists(rid).await,
            _ => Ok(false),
        }
    }

    /// Insert or update a document
    pub async fn save(&self, document: Document) -> ModelResult<Document> {
        self.ensure_open()?;
        let mut tx = self.tx.lock().await;
        let result = match tx.as_mut() {
            Some(state) => state.stage_save(self.storage(), document).await,
            None => self.storage().save(document).await,
        };
        drop(tx);
        if let Ok(saved) = &result {
            debug!(
                "Saved {} {} (version {}) on handle {}",
                saved.class_name(),
                saved.rid().unwrap_or(RecordId::NEW),
                saved.version(),
                self.id
            );
        }
        self.track(result)
    }

    /// Delete a record. A non-zero `version` must match the stored one.
    pub async fn delete(&self, rid: RecordId, version: i32) -> ModelResult<()> {
        self.ensure_open()?;
        let mut tx = self.tx.lock().await;
        let result = match tx.as_mut() {
            Some(state) => state.stage_delete(self.storage(), rid, version).await,
            None => self.storage().delete(rid, version).await,
        };
        drop(tx);
        if result.is_ok() {
            debug!("Deleted {} on handle {}", rid, self.id);
        }
        self.track(result)
    }

    /// Every record of a class, including staged writes
    pub async fn browse_class(&self, class_name: &str) -> ModelResult<Vec<Document>> {
        self.ensure_open()?;
        let result = self.storage().browse_class(class_name).await;
        let result = match result {
            Ok(stored) => {
                let tx = self.tx.lock().await;
                Ok(match tx.as_ref() {
                    Some(state) => state.overlay(class_name, stored),
                    None => stored,
                })
            }
            Err(err) => Err(err),
        };
        self.track(result)
    }

    /// Number of records of a class, including staged writes
    pub async fn count_class(&self, class_name: &str) -> ModelResult<u64> {
        self.ensure_open()?;
        if self.in_transaction().await {
            return Ok(self.browse_class(class_name).await?.len() as u64);
        }
        let result = self.storage().count_class(class_name).await;
        self.track(result)
    }

    /// Run an OSQL SELECT
    pub async fn query(
        &self,
        osql: &str,
        params: impl Into<QueryParams>,
    ) -> ModelResult<Vec<Document>> {
        self.ensure_open()?;
        let parsed = self.track(query::parse(osql).map_err(ModelError::from))?;
        self.select(parsed, &params.into()).await
    }

    /// Run an already-parsed SELECT
    pub async fn select(
        &self,
        query: SelectQuery,
        params: &QueryParams,
    ) -> ModelResult<Vec<Document>> {
        self.ensure_open()?;
        if self.factory.config.log_queries {
            debug!(target: "orient_orm::query", "handle {}: {}", self.id, query);
        }
        let bound = self.track(query.bind(params).map_err(ModelError::from))?;
        let candidates = self.browse_class(&bound.class_name).await?;
        Ok(bound.execute(candidates))
    }

    /// Close the handle. A pending transaction is rolled back.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut tx) = self.tx.try_lock() {
            if let Some(state) = tx.take() {
                self.storage().release(state.reserved());
                warn!(
                    "Handle {} closed with an open transaction; {} staged writes rolled back",
                    self.id,
                    state.len()
                );
            }
        }
        self.release();
    }

    fn release(&self) {
        let counters = &self.factory.counters;
        counters.open.fetch_sub(1, Ordering::AcqRel);
        counters.closed.fetch_add(1, Ordering::Relaxed);
        debug!("Closed database handle {}", self.id);
    }
}

impl Drop for DatabaseHandle {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(state) = self.tx.get_mut().take() {
            self.factory.storage.release(state.reserved());
            warn!(
                "Handle {} dropped with an open transaction; {} staged writes rolled back",
                self.id,
                state.len()
            );
        }
        self.release();
    }
}
