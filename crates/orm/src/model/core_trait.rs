//! Core Model Trait - Base definition for database entities
//!
//! Defines the fundamental Model trait: class metadata, record identity,
//! optional version tracking and the document conversion contract.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::error::{ModelError, ModelResult};
use crate::identity::RecordId;

/// Core trait for persistent entities
///
/// Implementors are plain serde structs. The record id is normally kept in
/// a `#[serde(skip)]` field so it never lands in the stored fields:
///
/// ```
/// use orient_orm::{Model, RecordId};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct Person {
///     #[serde(skip)]
///     rid: Option<RecordId>,
///     name: String,
/// }
///
/// impl Model for Person {
///     fn class_name() -> &'static str {
///         "Person"
///     }
///
///     fn record_id(&self) -> Option<RecordId> {
///         self.rid
///     }
///
///     fn set_record_id(&mut self, rid: RecordId) {
///         self.rid = Some(rid);
///     }
/// }
/// ```
pub trait Model: Send + Sync + Debug + Serialize + for<'de> Deserialize<'de> {
    /// Database class for this model
    fn class_name() -> &'static str;

    /// Record id stored on this instance
    fn record_id(&self) -> Option<RecordId>;

    /// Store the record id on this instance
    fn set_record_id(&mut self, rid: RecordId);

    /// Version this instance was read at. 0 disables the version check on
    /// update and delete.
    fn record_version(&self) -> i32 {
        0
    }

    /// Store the version after a load or save. Ignored unless the model
    /// tracks versions.
    fn set_record_version(&mut self, _version: i32) {}

    /// Validation hook run by `validate_and_save`
    fn validate(&self) -> ModelResult<()> {
        Ok(())
    }

    /// Convert to a document of this model's class
    fn to_document(&self) -> ModelResult<Document> {
        let fields = match serde_json::to_value(self)? {
            Value::Object(fields) => fields,
            other => {
                return Err(ModelError::Serialization(format!(
                    "{} must serialize to an object, got {}",
                    Self::class_name(),
                    other
                )))
            }
        };

        Ok(Document::with_fields(Self::class_name(), fields)
            .with_identity(self.record_id(), self.record_version()))
    }

    /// Build an instance from a stored document
    fn from_document(document: Document) -> ModelResult<Self>
    where
        Self: Sized,
    {
        let rid = document.rid();
        let version = document.version();
        let mut model: Self = serde_json::from_value(Value::Object(document.into_fields()))?;
        if let Some(rid) = rid {
            model.set_record_id(rid);
        }
        model.set_record_version(version);
        Ok(model)
    }
}
