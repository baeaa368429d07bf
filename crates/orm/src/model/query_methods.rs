//! Query Methods - Collection and batch query operations for models

use tracing::debug;

use crate::database::DatabaseHandle;
use crate::error::ModelResult;
use crate::model::core_trait::Model;
use crate::query::{QueryBuilder, QueryParams};

/// Trait providing query operations for model collections
pub trait QueryMethods: Model {
    /// Get a query builder for this model's class
    fn query() -> QueryBuilder<Self> {
        QueryBuilder::new(Self::class_name())
    }

    /// Every stored instance, in storage order
    async fn all(db: &DatabaseHandle) -> ModelResult<Vec<Self>> {
        db.browse_class(Self::class_name())
            .await?
            .into_iter()
            .map(Self::from_document)
            .collect()
    }

    /// Number of stored instances
    async fn count(db: &DatabaseHandle) -> ModelResult<u64> {
        db.count_class(Self::class_name()).await
    }

    /// Run an OSQL SELECT and map every row to this model
    async fn find(
        db: &DatabaseHandle,
        osql: &str,
        params: impl Into<QueryParams>,
    ) -> ModelResult<Vec<Self>> {
        db.query(osql, params)
            .await?
            .into_iter()
            .map(Self::from_document)
            .collect()
    }

    /// First stored instance, if any
    async fn first(db: &DatabaseHandle) -> ModelResult<Option<Self>> {
        db.browse_class(Self::class_name())
            .await?
            .into_iter()
            .next()
            .map(Self::from_document)
            .transpose()
    }

    /// Delete every stored instance one by one. Returns how many went.
    async fn delete_all(db: &DatabaseHandle) -> ModelResult<u64> {
        let documents = db.browse_class(Self::class_name()).await?;
        let mut deleted = 0;
        for document in documents {
            if let Some(rid) = document.rid() {
                db.delete(rid, document.version()).await?;
                deleted += 1;
            }
        }
        debug!("Deleted {} {} records", deleted, Self::class_name());
        Ok(deleted)
    }
}

impl<T: Model> QueryMethods for T {}
