//! CRUD Operations - Create, Read, Update, Delete operations for models
//!
//! Every operation delegates to the database handle it is given; the model
//! only converts itself to and from documents and keeps its identity.

use tracing::debug;

use crate::database::DatabaseHandle;
use crate::error::{ModelError, ModelResult};
use crate::identity::RecordId;
use crate::model::core_trait::Model;

/// Trait providing CRUD operations for models
pub trait CrudOperations: Model {
    /// A fresh instance that has not been stored yet
    fn new_instance() -> Self
    where
        Self: Default,
    {
        Self::default()
    }

    /// Load by record id. A missing record is `None`; every other failure
    /// is an error.
    async fn find_by_id(db: &DatabaseHandle, rid: RecordId) -> ModelResult<Option<Self>> {
        match Self::find_by_orid(db, rid).await {
            Ok(model) => Ok(Some(model)),
            Err(ModelError::RecordNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Load by record id, failing with `RecordNotFound` when absent
    async fn find_by_orid(db: &DatabaseHandle, rid: RecordId) -> ModelResult<Self> {
        let document = db.load(rid).await?;
        Self::from_document(document)
    }

    /// Insert or update. The instance receives its record id and version.
    async fn save(&mut self, db: &DatabaseHandle) -> ModelResult<()> {
        let document = self.to_document()?;
        let saved = db.save(document).await?;
        if let Some(rid) = saved.rid() {
            self.set_record_id(rid);
        }
        self.set_record_version(saved.version());
        Ok(())
    }

    /// Save only if `validate` passes. Returns whether it was saved.
    async fn validate_and_save(&mut self, db: &DatabaseHandle) -> ModelResult<bool> {
        if let Err(err) = self.validate() {
            debug!("{} failed validation: {}", Self::class_name(), err);
            return Ok(false);
        }
        self.save(db).await?;
        Ok(true)
    }

    /// Delete the stored record and hand the instance back
    async fn delete(self, db: &DatabaseHandle) -> ModelResult<Self> {
        let rid = persistent_id(&self)?;
        db.delete(rid, self.record_version()).await?;
        Ok(self)
    }

    /// Reload state from storage, discarding local changes
    async fn refresh(&mut self, db: &DatabaseHandle) -> ModelResult<()> {
        let rid = persistent_id(self)?;
        let document = db.reload(rid).await?;
        *self = Self::from_document(document)?;
        Ok(())
    }

    /// Whether the handle tracks a live record with this identity
    async fn is_managed(&self, db: &DatabaseHandle) -> ModelResult<bool> {
        db.is_managed(self.record_id()).await
    }
}

fn persistent_id<M: Model>(model: &M) -> ModelResult<RecordId> {
    model
        .record_id()
        .filter(RecordId::is_persistent)
        .ok_or(ModelError::MissingIdentity)
}

impl<T: Model> CrudOperations for T {}
