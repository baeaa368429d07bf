use orient_orm::{
    db, CrudOperations, DatabaseConfig, Keyed, Model, ModelError, ModelIdentity, Odb,
    QueryMethods, QueryParams, RecordId, TransactionConfig,
};
use orient_core::{init_logging, Environment, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Company {
    #[serde(skip)]
    rid: Option<RecordId>,
    name: String,
    city: String,
    employees: u32,
}

impl Model for Company {
    fn class_name() -> &'static str {
        "Company"
    }

    fn record_id(&self) -> Option<RecordId> {
        self.rid
    }

    fn set_record_id(&mut self, rid: RecordId) {
        self.rid = Some(rid);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Account {
    #[serde(skip)]
    rid: Option<RecordId>,
    #[serde(skip)]
    version: i32,
    owner: String,
    balance: i64,
}

impl Model for Account {
    fn class_name() -> &'static str {
        "Account"
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
}

fn init_test_logging() {
    // Several tests race to install the subscriber; only the first wins
    let _ = init_logging(LoggingConfig::for_environment(Environment::Testing));
}

fn company(name: &str, city: &str, employees: u32) -> Company {
    Company {
        name: name.to_string(),
        city: city.to_string(),
        employees,
        ..Company::new_instance()
    }
}

#[tokio::test]
async fn test_global_factory_and_db() {
    // Only this test touches the process-wide factory
    assert!(matches!(db(), Err(ModelError::Connection(_))));

    let odb = Odb::new(DatabaseConfig::memory("global").with_max_handles(4))
        .unwrap()
        .install_global()
        .unwrap();
    assert!(Odb::memory("second").install_global().is_err());

    let handle = db().unwrap();
    let mut acme = company("Acme", "Springfield", 12);
    acme.save(&handle).await.unwrap();
    handle.close();

    // A separate handle sees the committed record
    let other = db().unwrap();
    let found = Company::find_by_id(&other, acme.identity()).await.unwrap().unwrap();
    assert!(found.identity_eq(&acme));
    drop(other);

    assert_eq!(odb.stats().open_handles, 0);
    assert_eq!(odb.stats().opened_handles, 2);
}

#[tokio::test]
async fn test_queries_with_named_and_positional_parameters() {
    let odb = Odb::memory("queries");
    let db = odb.open().unwrap();

    for (name, city, employees) in [
        ("Acme", "Springfield", 12),
        ("Globex", "Cypress Creek", 300),
        ("Initech", "Austin", 45),
        ("Umbrella", "Raccoon City", 9000),
    ] {
        company(name, city, employees).save(&db).await.unwrap();
    }

    let big = Company::find(
        &db,
        "select from Company where employees > :min order by employees desc limit :n",
        QueryParams::new().set("min", 40).set("n", 2),
    )
    .await
    .unwrap();
    let names: Vec<_> = big.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Umbrella", "Globex"]);

    let texan = Company::find(
        &db,
        "SELECT FROM Company WHERE city = ? OR name LIKE ?",
        ["Austin", "Ac%"],
    )
    .await
    .unwrap();
    assert_eq!(texan.len(), 2);

    let err = Company::find(&db, "SELECT FROM Company WHERE city = ?", ())
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Query(_)));

    let paged = Company::query()
        .order_by("name")
        .paginate(2, 2)
        .get(&db)
        .await
        .unwrap();
    let names: Vec<_> = paged.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Initech", "Umbrella"]);
}

#[tokio::test]
async fn test_transfer_in_transaction() {
    init_test_logging();
    let odb = Odb::memory("bank");
    let db = odb.open().unwrap();

    let mut alice = Account {
        owner: "alice".to_string(),
        balance: 100,
        ..Account::default()
    };
    let mut bob = Account {
        owner: "bob".to_string(),
        balance: 20,
        ..Account::default()
    };
    alice.save(&db).await.unwrap();
    bob.save(&db).await.unwrap();

    let (alice_rid, bob_rid) = (alice.identity(), bob.identity());
    db.transaction(|db| async move {
        let mut from = Account::find_by_orid(db, alice_rid).await?;
        let mut to = Account::find_by_orid(db, bob_rid).await?;
        from.balance -= 30;
        to.balance += 30;
        from.save(db).await?;
        to.save(db).await?;
        Ok(())
    })
    .await
    .unwrap();

    alice.refresh(&db).await.unwrap();
    bob.refresh(&db).await.unwrap();
    assert_eq!((alice.balance, bob.balance), (70, 50));
    assert_eq!(alice.version, 2);
}

#[tokio::test]
async fn test_retry_after_concurrent_modification() {
    init_test_logging();
    let odb = Odb::memory("retry");
    let db = odb.open().unwrap();
    let intruder = odb.open().unwrap();

    let mut account = Account {
        owner: "carol".to_string(),
        balance: 10,
        ..Account::default()
    };
    account.save(&db).await.unwrap();
    let rid = account.identity();

    let attempts = std::sync::atomic::AtomicU32::new(0);
    let intruder = &intruder;
    let attempts_ref = &attempts;
    db.transaction_with(TransactionConfig::retrying(2), |db| async move {
        let mut current = Account::find_by_orid(db, rid).await?;
        current.balance += 5;
        current.save(db).await?;
        if attempts_ref.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
            // Sneak in a write before the first commit
            let mut other = Account::find_by_orid(intruder, rid).await?;
            other.balance += 100;
            other.save(intruder).await?;
        }
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    account.refresh(&db).await.unwrap();
    assert_eq!(account.balance, 115);
}

#[tokio::test]
async fn test_identity_in_collections() {
    let odb = Odb::memory("identity");
    let db = odb.open().unwrap();

    let mut acme = company("Acme", "Springfield", 12);
    acme.save(&db).await.unwrap();
    let reloaded = Company::find_by_orid(&db, acme.identity()).await.unwrap();

    let mut set = HashSet::new();
    set.insert(Keyed(acme.clone()));
    set.insert(Keyed(reloaded));
    set.insert(Keyed(company("Unsaved", "Nowhere", 0)));
    set.insert(Keyed(company("Unsaved", "Nowhere", 0)));
    assert_eq!(set.len(), 3);

    assert_eq!(acme.describe(), format!("Company[{}]", acme.identity()));
    assert!("#9:0".parse::<RecordId>().is_ok());
}
