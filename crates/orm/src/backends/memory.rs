//! In-memory storage engine
//!
//! Each class owns one cluster. Positions are handed out monotonically and
//! never reused, so a deleted record's identity stays dead. Versions start at
//! 1 and grow by one per write.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::core::{ObjectStorage, TxOperation};
use crate::document::Document;
use crate::error::{ModelError, OrmResult};
use crate::identity::RecordId;

/// First cluster id handed to user classes; lower ids are reserved
pub const FIRST_USER_CLUSTER: i16 = 9;

#[derive(Debug, Clone)]
struct StoredRecord {
    class_name: String,
    version: i32,
    fields: Map<String, Value>,
}

impl StoredRecord {
    fn to_document(&self, rid: RecordId) -> Document {
        Document::with_fields(self.class_name.clone(), self.fields.clone())
            .with_identity(Some(rid), self.version)
    }
}

#[derive(Debug)]
struct MemoryState {
    // lower-cased class name -> (cluster id, declared name)
    clusters: HashMap<String, (i16, String)>,
    next_cluster: i16,
    next_position: HashMap<i16, i64>,
    records: BTreeMap<RecordId, StoredRecord>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            clusters: HashMap::new(),
            next_cluster: FIRST_USER_CLUSTER,
            next_position: HashMap::new(),
            records: BTreeMap::new(),
        }
    }
}

impl MemoryState {
    fn cluster_of(&self, class_name: &str) -> Option<i16> {
        self.clusters
            .get(&class_name.to_lowercase())
            .map(|(cluster, _)| *cluster)
    }

    fn cluster_for(&mut self, class_name: &str) -> OrmResult<i16> {
        if let Some(cluster) = self.cluster_of(class_name) {
            return Ok(cluster);
        }
        let cluster = self.next_cluster;
        self.next_cluster = cluster.checked_add(1).ok_or_else(|| {
            ModelError::Database("no cluster ids left for new classes".to_string())
        })?;
        self.clusters
            .insert(class_name.to_lowercase(), (cluster, class_name.to_string()));
        debug!("Created cluster {} for class {}", cluster, class_name);
        Ok(cluster)
    }

    fn allocate(&mut self, class_name: &str) -> OrmResult<RecordId> {
        let cluster = self.cluster_for(class_name)?;
        let next = self.next_position.entry(cluster).or_insert(0);
        let rid = RecordId::new(cluster, *next);
        *next += 1;
        Ok(rid)
    }

    /// Version the record will get, or why the write is refused
    fn check_save(
        &self,
        document: &Document,
        base_version: i32,
        reserved: &HashSet<RecordId>,
    ) -> OrmResult<i32> {
        let rid = match document.rid() {
            Some(rid) if rid.is_persistent() => rid,
            _ => return Ok(1),
        };

        match self.records.get(&rid) {
            Some(stored) => {
                if !stored.class_name.eq_ignore_ascii_case(document.class_name()) {
                    return Err(ModelError::Database(format!(
                        "record {} belongs to class {}, not {}",
                        rid,
                        stored.class_name,
                        document.class_name()
                    )));
                }
                if base_version != 0 && base_version != stored.version {
                    return Err(ModelError::ConcurrentModification {
                        rid,
                        expected: base_version,
                        actual: stored.version,
                    });
                }
                Ok(stored.version + 1)
            }
            None if reserved.contains(&rid) && base_version == 0 => {
                if self.cluster_of(document.class_name()) != Some(rid.cluster()) {
                    return Err(ModelError::Database(format!(
                        "record {} is not in the cluster of class {}",
                        rid,
                        document.class_name()
                    )));
                }
                Ok(1)
            }
            None => Err(ModelError::RecordNotFound(rid)),
        }
    }

    fn check_delete(&self, rid: RecordId, base_version: i32) -> OrmResult<()> {
        let stored = self
            .records
            .get(&rid)
            .ok_or(ModelError::RecordNotFound(rid))?;
        if base_version != 0 && base_version != stored.version {
            return Err(ModelError::ConcurrentModification {
                rid,
                expected: base_version,
                actual: stored.version,
            });
        }
        Ok(())
    }

    /// Store a document that already passed `check_save`
    fn write(&mut self, document: Document, version: i32) -> OrmResult<Document> {
        let rid = match document.rid() {
            Some(rid) if rid.is_persistent() => rid,
            _ => self.allocate(document.class_name())?,
        };

        let class_name = self
            .clusters
            .get(&document.class_name().to_lowercase())
            .map(|(_, declared)| declared.clone())
            .unwrap_or_else(|| document.class_name().to_string());
        let record = StoredRecord {
            class_name,
            version,
            fields: document.into_fields(),
        };
        let saved = record.to_document(rid);
        self.records.insert(rid, record);
        Ok(saved)
    }

    fn documents_of(&self, cluster: i16) -> impl Iterator<Item = (&RecordId, &StoredRecord)> {
        self.records
            .range(RecordId::new(cluster, 0)..=RecordId::new(cluster, i64::MAX))
    }
}

/// Process-local storage behind `memory:` URLs
#[derive(Debug)]
pub struct MemoryStorage {
    name: String,
    state: RwLock<MemoryState>,
    // Allocated but not yet written. Locked after `state`, never before.
    reserved: Mutex<HashSet<RecordId>>,
    closed: AtomicBool,
}

impl MemoryStorage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(MemoryState::default()),
            reserved: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn reservations(&self) -> MutexGuard<'_, HashSet<RecordId>> {
        self.reserved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn reserved_count(&self) -> usize {
        self.reservations().len()
    }

    fn ensure_open(&self) -> OrmResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ModelError::Connection(format!(
                "storage '{}' is closed",
                self.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn allocate(&self, class_name: &str) -> OrmResult<RecordId> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        let rid = state.allocate(class_name)?;
        self.reservations().insert(rid);
        Ok(rid)
    }

    async fn load(&self, rid: RecordId) -> OrmResult<Document> {
        self.ensure_open()?;
        let state = self.state.read().await;
        state
            .records
            .get(&rid)
            .map(|record| record.to_document(rid))
            .ok_or(ModelError::RecordNotFound(rid))
    }

    async fn save(&self, document: Document) -> OrmResult<Document> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        let mut reserved = self.reservations();
        let version = state.check_save(&document, document.version(), &reserved)?;
        let saved = state.write(document, version)?;
        if let Some(rid) = saved.rid() {
            reserved.remove(&rid);
        }
        drop(reserved);
        debug!("Stored {} version {} in '{}'", saved.class_name(), saved.version(), self.name);
        Ok(saved)
    }

    async fn delete(&self, rid: RecordId, version: i32) -> OrmResult<()> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        state.check_delete(rid, version)?;
        state.records.remove(&rid);
        debug!("Deleted {} from '{}'", rid, self.name);
        Ok(())
    }

    async fn browse_class(&self, class_name: &str) -> OrmResult<Vec<Document>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        let cluster = match state.cluster_of(class_name) {
            Some(cluster) => cluster,
            None => return Ok(Vec::new()),
        };
        Ok(state
            .documents_of(cluster)
            .map(|(rid, record)| record.to_document(*rid))
            .collect())
    }

    async fn count_class(&self, class_name: &str) -> OrmResult<u64> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(match state.cluster_of(class_name) {
            Some(cluster) => state.documents_of(cluster).count() as u64,
            None => 0,
        })
    }

    async fn apply(&self, operations: Vec<TxOperation>) -> OrmResult<Vec<Document>> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        let mut reserved = self.reservations();

        // Validate everything before the first write
        let mut versions = Vec::with_capacity(operations.len());
        for operation in &operations {
            match operation {
                TxOperation::Save { document, base_version } => {
                    versions.push(state.check_save(document, *base_version, &reserved)?);
                }
                TxOperation::Delete { rid, base_version } => {
                    state.check_delete(*rid, *base_version)?;
                    versions.push(0);
                }
            }
        }

        let mut saved = Vec::new();
        for (operation, version) in operations.into_iter().zip(versions) {
            match operation {
                TxOperation::Save { document, .. } => {
                    let written = state.write(document, version)?;
                    if let Some(rid) = written.rid() {
                        reserved.remove(&rid);
                    }
                    saved.push(written);
                }
                TxOperation::Delete { rid, .. } => {
                    state.records.remove(&rid);
                }
            }
        }

        drop(reserved);
        debug!("Applied {} staged writes to '{}'", saved.len(), self.name);
        Ok(saved)
    }

    async fn classes(&self) -> OrmResult<Vec<String>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        let mut classes: Vec<(i16, String)> = state
            .clusters
            .values()
            .map(|(cluster, name)| (*cluster, name.clone()))
            .collect();
        classes.sort();
        Ok(classes.into_iter().map(|(_, name)| name).collect())
    }

    fn release(&self, rids: &[RecordId]) {
        if rids.is_empty() {
            return;
        }
        let mut reserved = self.reservations();
        for rid in rids {
            reserved.remove(rid);
        }
        debug!("Released {} reserved identities in '{}'", rids.len(), self.name);
    }

    async fn close(&self) -> OrmResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let mut state = self.state.write().await;
            let dropped = state.records.len();
            *state = MemoryState::default();
            self.reservations().clear();
            debug!("Closed memory storage '{}' ({} records dropped)", self.name, dropped);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(class_name: &str, fields: Value) -> Document {
        let Value::Object(map) = fields else {
            unreachable!()
        };
        Document::with_fields(class_name, map)
    }

    #[tokio::test]
    async fn test_insert_assigns_identity_and_version() {
        let storage = MemoryStorage::new("test");
        let first = storage.save(doc("Person", json!({"name": "Ada"}))).await.unwrap();
        let second = storage.save(doc("Person", json!({"name": "Alan"}))).await.unwrap();
        let other = storage.save(doc("Company", json!({"name": "ACME"}))).await.unwrap();

        assert_eq!(first.rid(), Some(RecordId::new(FIRST_USER_CLUSTER, 0)));
        assert_eq!(second.rid(), Some(RecordId::new(FIRST_USER_CLUSTER, 1)));
        assert_eq!(other.rid(), Some(RecordId::new(FIRST_USER_CLUSTER + 1, 0)));
        assert_eq!(first.version(), 1);
        assert_eq!(storage.classes().await.unwrap(), vec!["Person", "Company"]);
    }

    #[tokio::test]
    async fn test_update_checks_version() {
        let storage = MemoryStorage::new("test");
        let mut stored = storage.save(doc("Person", json!({"name": "Ada"}))).await.unwrap();

        stored.set_field("name", "Ada Lovelace");
        let updated = storage.save(stored.clone()).await.unwrap();
        assert_eq!(updated.version(), 2);

        // `stored` still carries version 1
        let err = storage.save(stored).await.unwrap_err();
        assert_eq!(
            err,
            ModelError::ConcurrentModification {
                rid: updated.rid().unwrap(),
                expected: 1,
                actual: 2,
            }
        );

        // Version 0 skips the check
        let mut unversioned = updated.clone();
        unversioned.set_version(0);
        assert_eq!(storage.save(unversioned).await.unwrap().version(), 3);
    }

    #[tokio::test]
    async fn test_load_and_delete() {
        let storage = MemoryStorage::new("test");
        let stored = storage.save(doc("Person", json!({"name": "Ada"}))).await.unwrap();
        let rid = stored.rid().unwrap();

        let loaded = storage.load(rid).await.unwrap();
        assert_eq!(loaded.resolve("name"), json!("Ada"));

        storage.delete(rid, 1).await.unwrap();
        assert_eq!(storage.load(rid).await.unwrap_err(), ModelError::RecordNotFound(rid));
        assert_eq!(storage.delete(rid, 0).await.unwrap_err(), ModelError::RecordNotFound(rid));

        // Deleted identities are not revived by a save
        let mut ghost = stored;
        ghost.set_version(0);
        assert_eq!(storage.save(ghost).await.unwrap_err(), ModelError::RecordNotFound(rid));
    }

    #[tokio::test]
    async fn test_class_names_are_case_insensitive() {
        let storage = MemoryStorage::new("test");
        storage.save(doc("Person", json!({}))).await.unwrap();
        storage.save(doc("person", json!({}))).await.unwrap();

        assert_eq!(storage.count_class("PERSON").await.unwrap(), 2);
        let docs = storage.browse_class("person").await.unwrap();
        assert!(docs.iter().all(|d| d.class_name() == "Person"));
        assert_eq!(storage.count_class("Unknown").await.unwrap(), 0);
        assert!(storage.browse_class("Unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reserved_identity_is_written_once() {
        let storage = MemoryStorage::new("test");
        let rid = storage.allocate("Person").await.unwrap();
        assert_eq!(storage.count_class("Person").await.unwrap(), 0);

        let pending = doc("Person", json!({"name": "Ada"})).with_identity(Some(rid), 0);
        let saved = storage.save(pending.clone()).await.unwrap();
        assert_eq!(saved.rid(), Some(rid));
        assert_eq!(saved.version(), 1);

        // A second insert at the same identity is an update at version 0
        assert_eq!(storage.save(pending).await.unwrap().version(), 2);
        assert_eq!(storage.reserved_count(), 0);
    }

    #[tokio::test]
    async fn test_released_identity_cannot_be_written() {
        let storage = MemoryStorage::new("test");
        let rid = storage.allocate("Person").await.unwrap();
        assert_eq!(storage.reserved_count(), 1);

        storage.release(&[rid]);
        assert_eq!(storage.reserved_count(), 0);

        let late = doc("Person", json!({"name": "Late"})).with_identity(Some(rid), 0);
        assert_eq!(storage.save(late).await.unwrap_err(), ModelError::RecordNotFound(rid));
        // Positions are never handed out twice
        assert_eq!(storage.allocate("Person").await.unwrap(), RecordId::new(rid.cluster(), 1));
    }

    #[tokio::test]
    async fn test_apply_is_all_or_nothing() {
        let storage = MemoryStorage::new("test");
        let ada = storage.save(doc("Person", json!({"name": "Ada"}))).await.unwrap();
        let alan = storage.save(doc("Person", json!({"name": "Alan"}))).await.unwrap();

        let mut renamed = ada.clone();
        renamed.set_field("name", "Ada L.");
        let result = storage
            .apply(vec![
                TxOperation::Save { document: renamed, base_version: 1 },
                TxOperation::Delete { rid: alan.rid().unwrap(), base_version: 7 },
            ])
            .await;
        assert!(matches!(result, Err(ModelError::ConcurrentModification { .. })));

        let unchanged = storage.load(ada.rid().unwrap()).await.unwrap();
        assert_eq!(unchanged.resolve("name"), json!("Ada"));
        assert_eq!(storage.count_class("Person").await.unwrap(), 2);

        let saved = storage
            .apply(vec![
                TxOperation::Save { document: doc("Person", json!({"name": "Grace"})), base_version: 0 },
                TxOperation::Delete { rid: alan.rid().unwrap(), base_version: 1 },
            ])
            .await
            .unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(storage.count_class("Person").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_closed_storage_rejects_calls() {
        let storage = MemoryStorage::new("test");
        storage.save(doc("Person", json!({}))).await.unwrap();
        storage.close().await.unwrap();

        assert!(matches!(
            storage.count_class("Person").await,
            Err(ModelError::Connection(_))
        ));
        // Closing twice is harmless
        storage.close().await.unwrap();
    }
}
