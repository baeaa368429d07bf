//! Model trait tests
//!
//! Cover the active-record operations, identity semantics and the query
//! builder through a small test model.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::database::Odb;
use crate::error::{ModelError, ModelResult};
use crate::identity::RecordId;
use crate::model::{CrudOperations, Keyed, Model, ModelIdentity, QueryMethods};

/// Test model for use in tests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TestUser {
    #[serde(skip)]
    rid: Option<RecordId>,
    #[serde(skip)]
    version: i32,
    email: String,
    name: String,
    #[serde(default)]
    age: Option<u32>,
}

impl Model for TestUser {
    fn class_name() -> &'static str {
        "User"
    }

    fn record_id(&self) -> Option<RecordId> {
        self.rid
    }

    fn set_record_id(&mut self, rid: RecordId) {
        self.rid = Some(rid);
    }

    fn record_version(&self) -> i32 {
        self.version
    }

    fn set_record_version(&mut self, version: i32) {
        self.version = version;
    }

    fn validate(&self) -> ModelResult<()> {
        if !self.email.contains('@') {
            return Err(ModelError::Validation(format!("invalid email '{}'", self.email)));
        }
        Ok(())
    }
}

fn user(name: &str, email: &str, age: u32) -> TestUser {
    TestUser {
        name: name.to_string(),
        email: email.to_string(),
        age: Some(age),
        ..TestUser::new_instance()
    }
}

#[test]
fn test_new_instance_is_unsaved() {
    let fresh = TestUser::new_instance();
    assert!(fresh.record_id().is_none());
    assert!(fresh.key().is_none());
    assert_eq!(fresh.identity(), RecordId::NEW);
    assert_eq!(fresh.describe(), "User[#-1:-1]");
}

#[test]
fn test_document_conversion_skips_identity() {
    let mut alice = user("Alice", "alice@example.com", 30);
    alice.set_record_id(RecordId::new(9, 4));
    alice.set_record_version(2);

    let document = alice.to_document().unwrap();
    assert_eq!(document.class_name(), "User");
    assert_eq!(document.rid(), Some(RecordId::new(9, 4)));
    assert_eq!(document.version(), 2);
    assert!(document.field("rid").is_none());
    assert_eq!(document.field("email"), Some(&json!("alice@example.com")));

    let back = TestUser::from_document(document).unwrap();
    assert_eq!(back.rid, Some(RecordId::new(9, 4)));
    assert_eq!(back.version, 2);
    assert_eq!(back.age, Some(30));
}

#[test]
fn test_identity_equality() {
    let a = user("Alice", "alice@example.com", 30);
    let b = a.clone();
    // Unsaved instances are only equal to themselves
    assert!(a.identity_eq(&a));
    assert!(!a.identity_eq(&b));

    let mut c = a.clone();
    let mut d = user("Someone else", "x@example.com", 1);
    c.set_record_id(RecordId::new(9, 0));
    d.set_record_id(RecordId::new(9, 0));
    assert!(c.identity_eq(&d));
    assert_eq!(c.identity_hash(), d.identity_hash());
    assert_eq!(Keyed(c.clone()), Keyed(d));
    assert_eq!(Keyed(c).to_string(), "User[#9:0]");
}

#[test]
fn test_query_builder_is_scoped_to_class() {
    let osql = TestUser::query().where_gt("age", 18).order_by("name").to_osql();
    assert_eq!(osql, "SELECT FROM User WHERE age > 18 ORDER BY name ASC");
}

#[tokio::test]
async fn test_save_assigns_identity_and_version() {
    let odb = Odb::memory("model-save");
    let db = odb.open().unwrap();

    let mut alice = user("Alice", "alice@example.com", 30);
    alice.save(&db).await.unwrap();
    let rid = alice.key().unwrap();
    assert_eq!(rid.cluster(), 9);
    assert_eq!(alice.version, 1);

    alice.age = Some(31);
    alice.save(&db).await.unwrap();
    assert_eq!(alice.key(), Some(rid));
    assert_eq!(alice.version, 2);
    assert!(alice.is_managed(&db).await.unwrap());
}

#[tokio::test]
async fn test_find_by_id_translates_not_found() {
    let odb = Odb::memory("model-find");
    let db = odb.open().unwrap();

    let mut alice = user("Alice", "alice@example.com", 30);
    alice.save(&db).await.unwrap();
    let rid = alice.key().unwrap();

    let found = TestUser::find_by_id(&db, rid).await.unwrap().unwrap();
    assert_eq!(found.name, "Alice");
    assert!(found.identity_eq(&alice));

    let ghost = RecordId::new(9, 99);
    assert!(TestUser::find_by_id(&db, ghost).await.unwrap().is_none());
    assert_eq!(
        TestUser::find_by_orid(&db, ghost).await.unwrap_err(),
        ModelError::RecordNotFound(ghost)
    );

    // Other failures still propagate
    db.close();
    assert_eq!(
        TestUser::find_by_id(&db, rid).await.unwrap_err(),
        ModelError::DatabaseClosed
    );
}

#[tokio::test]
async fn test_validate_and_save() {
    let odb = Odb::memory("model-validate");
    let db = odb.open().unwrap();

    let mut bad = user("Bob", "not-an-email", 20);
    assert!(!bad.validate_and_save(&db).await.unwrap());
    assert!(bad.key().is_none());
    assert_eq!(TestUser::count(&db).await.unwrap(), 0);

    bad.email = "bob@example.com".to_string();
    assert!(bad.validate_and_save(&db).await.unwrap());
    assert_eq!(TestUser::count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_delete_and_refresh() {
    let odb = Odb::memory("model-delete");
    let db = odb.open().unwrap();

    let mut alice = user("Alice", "alice@example.com", 30);
    alice.save(&db).await.unwrap();
    let mut stale = alice.clone();

    alice.name = "Alice Liddell".to_string();
    alice.save(&db).await.unwrap();

    // A stale copy cannot overwrite or delete the newer version
    stale.name = "Overwrite".to_string();
    assert!(matches!(
        stale.save(&db).await,
        Err(ModelError::ConcurrentModification { expected: 1, actual: 2, .. })
    ));
    stale.refresh(&db).await.unwrap();
    assert_eq!(stale.name, "Alice Liddell");
    assert_eq!(stale.version, 2);

    let deleted = stale.delete(&db).await.unwrap();
    assert_eq!(deleted.name, "Alice Liddell");
    assert!(!deleted.is_managed(&db).await.unwrap());
    assert_eq!(TestUser::count(&db).await.unwrap(), 0);

    let unsaved = TestUser::new_instance();
    assert_eq!(unsaved.delete(&db).await.unwrap_err(), ModelError::MissingIdentity);
}

#[tokio::test]
async fn test_collection_queries() {
    let odb = Odb::memory("model-collections");
    let db = odb.open().unwrap();

    for (name, age) in [("Alice", 30), ("Bob", 17), ("Carol", 45)] {
        let mut model = user(name, &format!("{}@example.com", name.to_lowercase()), age);
        model.save(&db).await.unwrap();
    }

    assert_eq!(TestUser::all(&db).await.unwrap().len(), 3);
    assert_eq!(TestUser::first(&db).await.unwrap().unwrap().name, "Alice");

    let adults = TestUser::find(&db, "SELECT FROM User WHERE age >= ? ORDER BY age DESC", [18])
        .await
        .unwrap();
    let names: Vec<_> = adults.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, ["Carol", "Alice"]);

    let minors = TestUser::query().where_lt("age", 18).get(&db).await.unwrap();
    assert_eq!(minors.len(), 1);
    assert_eq!(TestUser::query().where_like("name", "%o%").count(&db).await.unwrap(), 2);

    assert_eq!(TestUser::delete_all(&db).await.unwrap(), 3);
    assert_eq!(TestUser::count(&db).await.unwrap(), 0);
    assert!(TestUser::first(&db).await.unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_ignores_staged_changes() {
    let odb = Odb::memory("model-refresh-tx");
    let db = odb.open().unwrap();

    let mut alice = user("Alice", "alice@example.com", 30);
    alice.save(&db).await.unwrap();

    db.begin().await.unwrap();
    let mut staged = alice.clone();
    staged.name = "Staged".to_string();
    staged.save(&db).await.unwrap();
    assert_eq!(TestUser::find_by_orid(&db, alice.identity()).await.unwrap().name, "Staged");

    alice.refresh(&db).await.unwrap();
    assert_eq!(alice.name, "Alice");
    db.rollback().await.unwrap();
}
